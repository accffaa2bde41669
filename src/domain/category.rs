//! Category Entity
//!
//! Categories group items. A category is nothing but its name.

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// Filter label that selects every item; never a real category
pub const ALL_CATEGORIES: &str = "All";

/// A named category owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Entity for Category {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.name.clone()
    }
}

/// The two independently streamed collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Items,
    Categories,
}

impl Collection {
    /// Collection name in the document store
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Items => "inventory",
            Collection::Categories => "categories",
        }
    }
}
