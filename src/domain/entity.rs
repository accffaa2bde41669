//! Domain Layer - Core Entity Trait
//!
//! Every record held in a canonical set has a stable, comparable identifier.
//! Snapshot diffing is written once against this trait.

/// Core trait for all domain entities
pub trait Entity: Clone + PartialEq + Send + Sync {
    /// The type of the entity's unique identifier
    type Id: Clone + Ord + std::hash::Hash + std::fmt::Debug + Send + Sync;

    /// Returns the entity's unique identifier
    fn id(&self) -> Self::Id;
}
