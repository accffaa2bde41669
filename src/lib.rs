//! Inventory Sync
//!
//! Layered architecture:
//! - domain: Core entities, validation and errors
//! - repository: Store Adapter traits and implementations
//! - sync: Change streams, projection, selection, migration and dispatch
//! - session / account / config / client: the wiring around them

pub mod account;
pub mod client;
pub mod config;
pub mod domain;
pub mod repository;
pub mod session;
pub mod sync;

pub use account::{record_profile, ProfileOutcome};
pub use client::InventoryClient;
pub use config::{init_logging, load_config, mark_migrated, open_store, save_config, Backend, SyncConfig};
pub use domain::{Category, DomainError, DomainResult, Item, ItemId, OwnerId, StoreError};
pub use session::{Session, SessionState};
pub use sync::{
    AssignmentReport, CategoryFilter, MigrationReport, MutationDispatcher, ProjectionEngine, SelectionTracker,
    SortKey, ViewEvent,
};
