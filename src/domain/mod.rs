//! Domain Layer
//!
//! Contains all domain entities and core abstractions.
//! This layer has no storage or runtime dependencies.

mod category;
mod entity;
mod error;
mod item;
mod owner;

pub use category::{Category, Collection, ALL_CATEGORIES};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, StoreError, StoreResult};
pub use item::{
    parse_quantity, validate_name, validate_quantity, Item, ItemDraft, ItemId, ItemPatch,
};
pub use owner::OwnerId;
