//! Repository Layer - Store Adapter Traits
//!
//! Defines the abstract interfaces over a persistent inventory store.
//! Implementations: local SQLite, and a document store with live snapshots.
//! The synchronization core is written against these traits only.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Category, Item, ItemDraft, ItemId, ItemPatch, OwnerId, StoreResult};

/// Live feed of full collection snapshots for one owner
///
/// The first message is the current state; one more follows every
/// committed change. Dropping the receiver ends the subscription.
pub type SnapshotStream<T> = mpsc::UnboundedReceiver<StoreResult<Vec<T>>>;

/// Item collection operations
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Create an item; the store assigns its identifier
    async fn insert_item(&self, owner: &OwnerId, draft: &ItemDraft) -> StoreResult<Item>;

    /// Update the given fields and return the resulting record
    async fn update_item(&self, owner: &OwnerId, id: &ItemId, patch: &ItemPatch) -> StoreResult<Item>;

    /// Delete an item
    async fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> StoreResult<()>;

    /// All items visible to the owner
    async fn load_items(&self, owner: &OwnerId) -> StoreResult<Vec<Item>>;

    /// Write every item under its own identifier, all or nothing
    async fn batch_write_items(&self, owner: &OwnerId, items: &[Item]) -> StoreResult<()>;

    /// Subscribe to item snapshots
    async fn subscribe_items(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Item>>;
}

/// Category collection operations
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Create a category; an existing name is a `Conflict`
    async fn insert_category(&self, owner: &OwnerId, name: &str) -> StoreResult<Category>;

    async fn load_categories(&self, owner: &OwnerId) -> StoreResult<Vec<Category>>;

    /// Subscribe to category snapshots
    async fn subscribe_categories(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Category>>;
}

/// User profile record written after sign-up
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn write_profile(&self, owner: &OwnerId, email: &str) -> StoreResult<()>;
}

/// A complete Store Adapter
pub trait StoreAdapter: InventoryStore + CategoryStore + ProfileStore {}

impl<T: InventoryStore + CategoryStore + ProfileStore> StoreAdapter for T {}
