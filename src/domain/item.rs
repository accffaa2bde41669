//! Item Entity
//!
//! An inventory line: name, quantity and an optional category
//! (empty string when uncategorized).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::Entity;
use super::error::{DomainError, DomainResult};

/// Store-assigned item identifier
///
/// The local store hands out integers, the document store strings.
/// The core only compares and displays them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Local(i64),
    Remote(String),
}

impl ItemId {
    /// Remote document id a local record migrates to
    ///
    /// Deterministic, so a retried migration overwrites instead of duplicating.
    pub fn migration_target(&self) -> ItemId {
        ItemId::Remote(self.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Local(id) => write!(f, "{}", id),
            ItemId::Remote(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Local(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Remote(id.to_string())
    }
}

/// An inventory item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub quantity: u32,
    /// Empty means uncategorized
    #[serde(default)]
    pub category: String,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity,
            category: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category.is_empty()
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}

/// Validated input for a new item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: String,
    pub quantity: u32,
    pub category: String,
}

impl ItemDraft {
    /// Validate raw user input
    pub fn new(name: &str, quantity: i64) -> DomainResult<Self> {
        Ok(Self {
            name: validate_name(name)?,
            quantity: validate_quantity(quantity)?,
            category: String::new(),
        })
    }
}

/// Field-level update; `None` leaves the stored field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub category: Option<String>,
}

impl ItemPatch {
    pub fn details(name: String, quantity: u32) -> Self {
        Self {
            name: Some(name),
            quantity: Some(quantity),
            category: None,
        }
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none() && self.category.is_none()
    }

    /// Apply to an item in memory, mirroring what the store does
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(category) = &self.category {
            item.category = category.clone();
        }
    }
}

/// Trimmed, non-empty item name
pub fn validate_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("item name cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn validate_quantity(quantity: i64) -> DomainResult<u32> {
    if quantity < 0 {
        return Err(DomainError::Validation("quantity cannot be negative".to_string()));
    }
    u32::try_from(quantity).map_err(|_| DomainError::Validation(format!("quantity {} is too large", quantity)))
}

/// Parse a quantity typed into a text field
pub fn parse_quantity(text: &str) -> DomainResult<u32> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DomainError::Validation("quantity is required".to_string()));
    }
    let value: i64 = text
        .parse()
        .map_err(|_| DomainError::Validation("quantity must be a valid number".to_string()))?;
    validate_quantity(value)
}
