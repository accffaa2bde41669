//! Repository Layer
//!
//! Store Adapter abstractions and the two implementations.

mod db;
mod document_store;
mod documents;
mod local_store;
mod subscribers;
mod traits;


pub use db::{open_db, open_in_memory_db};
pub use document_store::DocumentStore;
pub use documents::{CategoryDocument, Document, ItemDocument, ProfileDocument, CATEGORIES, INVENTORY, USERS};
pub use local_store::SqliteStore;
pub use traits::{CategoryStore, InventoryStore, ProfileStore, SnapshotStream, StoreAdapter};
