//! Migration Coordinator
//!
//! Moves a batch of local-only items into the shared store under
//! deterministic remote ids, all or nothing. While a batch is in flight
//! ordinary mutations are refused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{DomainError, DomainResult, Item, ItemId, OwnerId};
use crate::repository::{InventoryStore, StoreAdapter};
use crate::session::Session;

/// Mutual exclusion between migration and ordinary writes
///
/// Ordinary writes hold a read guard for the duration of their store call.
/// A migration raises the flag first, so new writes bounce, then takes the
/// write guard, which waits for in-flight writes to drain.
#[derive(Debug, Default)]
pub struct MigrationGate {
    in_progress: AtomicBool,
    lock: RwLock<()>,
}

/// Held by a running migration; lowers the flag on drop
pub struct MigrationGuard<'a> {
    gate: &'a MigrationGate,
    _exclusive: Option<RwLockWriteGuard<'a, ()>>,
}

impl Drop for MigrationGuard<'_> {
    fn drop(&mut self) {
        self.gate.in_progress.store(false, Ordering::SeqCst);
    }
}

impl MigrationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Enter as an ordinary write
    pub async fn write_permit(&self) -> DomainResult<RwLockReadGuard<'_, ()>> {
        if self.in_progress() {
            return Err(DomainError::MigrationInProgress);
        }
        let permit = self.lock.read().await;
        // A migration may have started while we waited
        if self.in_progress() {
            return Err(DomainError::MigrationInProgress);
        }
        Ok(permit)
    }

    /// Enter as the single migration
    pub async fn begin_migration(&self) -> DomainResult<MigrationGuard<'_>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DomainError::MigrationInProgress);
        }
        // Lowers the flag again if this future is dropped while waiting
        let mut guard = MigrationGuard {
            gate: self,
            _exclusive: None,
        };
        guard._exclusive = Some(self.lock.write().await);
        Ok(guard)
    }
}

/// Outcome of a committed migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub owner: OwnerId,
    pub migrated: Vec<ItemId>,
}

impl MigrationReport {
    pub fn count(&self) -> usize {
        self.migrated.len()
    }
}

/// Local ids paired with the record written under each remote target
///
/// Records are copied as stored, including legacy rows with no name.
struct PendingBatch {
    entries: Vec<(ItemId, Item)>,
}

impl PendingBatch {
    fn build(local_items: &[Item]) -> Self {
        let entries = local_items
            .iter()
            .map(|local| {
                let target = Item {
                    id: local.id.migration_target(),
                    name: local.name.clone(),
                    quantity: local.quantity,
                    category: local.category.clone(),
                };
                (local.id.clone(), target)
            })
            .collect();
        Self { entries }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn records(&self) -> Vec<Item> {
        self.entries.iter().map(|(_, target)| target.clone()).collect()
    }

    fn target_ids(&self) -> Vec<ItemId> {
        self.entries.iter().map(|(_, target)| target.id.clone()).collect()
    }
}

pub struct MigrationCoordinator {
    store: Arc<dyn StoreAdapter>,
    session: Arc<dyn Session>,
    gate: Arc<MigrationGate>,
}

impl MigrationCoordinator {
    pub fn new(store: Arc<dyn StoreAdapter>, session: Arc<dyn Session>, gate: Arc<MigrationGate>) -> Self {
        Self { store, session, gate }
    }

    pub fn gate(&self) -> &Arc<MigrationGate> {
        &self.gate
    }

    /// Copy `local_items` into the store as one atomic batch
    pub async fn migrate(&self, local_items: &[Item]) -> DomainResult<MigrationReport> {
        let owner = self.session.current_user_id().ok_or(DomainError::NotAuthenticated)?;

        if local_items.is_empty() {
            return Err(DomainError::Validation("no items to migrate".to_string()));
        }

        let _guard = self.gate.begin_migration().await?;

        let batch = PendingBatch::build(local_items);
        let count = batch.len();
        tracing::debug!("migrating {} items for {}", count, owner);

        self.store
            .batch_write_items(&owner, &batch.records())
            .await
            .map_err(|cause| {
                tracing::error!("migration of {} items failed: {}", count, cause);
                DomainError::MigrationAborted { count, cause }
            })?;

        tracing::info!("migrated {} items for {}", count, owner);
        Ok(MigrationReport {
            owner,
            migrated: batch.target_ids(),
        })
    }

    /// Load the owner's items from `local` and migrate them
    pub async fn migrate_from(&self, local: &dyn StoreAdapter) -> DomainResult<MigrationReport> {
        let owner = self.session.current_user_id().ok_or(DomainError::NotAuthenticated)?;
        let items = local
            .load_items(&owner)
            .await
            .map_err(|cause| DomainError::from_store("load_items", "local store", cause))?;
        self.migrate(&items).await
    }
}
