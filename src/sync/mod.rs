//! Synchronization Core
//!
//! Change Stream, Projection Engine, Selection Tracker, Migration
//! Coordinator and Mutation Dispatcher. Written against the Store Adapter
//! traits only.

mod change_stream;
mod dispatcher;
mod migration;
mod projection;
mod selection;

#[cfg(test)]
mod tests;

pub use change_stream::{diff_categories, diff_items, ingest_categories, ingest_items, ChangeStream, Confirmation, Mutation};
pub use dispatcher::{AssignmentReport, MutationDispatcher};
pub use migration::{MigrationCoordinator, MigrationGate, MigrationGuard, MigrationReport};
pub use projection::{Canonical, CategoryFilter, ProjectionEngine, RecordKey, SortKey, ViewEvent};
pub use selection::SelectionTracker;
