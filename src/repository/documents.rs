//! Document Shapes
//!
//! Field names of records in the document store. Existing stored data uses
//! exactly these names, so they are part of the storage contract.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Category, Item, ItemId, OwnerId, StoreError, StoreResult};

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

pub const INVENTORY: &str = "inventory";
pub const CATEGORIES: &str = "categories";
pub const USERS: &str = "users";

/// `inventory/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<i64>,
}

impl ItemDocument {
    pub fn new(owner: &OwnerId, name: &str, quantity: u32, category: &str, created_at: i64) -> Self {
        Self {
            name: Some(name.to_string()),
            quantity: Some(i64::from(quantity)),
            category: Some(category.to_string()),
            user_id: owner.to_string(),
            created_at: Some(created_at),
        }
    }

    /// Missing or null fields read back as empty / zero
    pub fn into_item(self, doc_id: &str) -> Item {
        Item {
            id: ItemId::Remote(doc_id.to_string()),
            name: self.name.unwrap_or_default(),
            quantity: self.quantity.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32,
            category: self.category.unwrap_or_default(),
        }
    }
}

/// `categories/{name}_{userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDocument {
    pub name: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<i64>,
}

impl CategoryDocument {
    pub fn doc_id(name: &str, owner: &OwnerId) -> String {
        format!("{}_{}", name, owner)
    }

    pub fn into_category(self) -> Category {
        Category::new(self.name)
    }
}

/// `users/{userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

pub fn to_document<T: Serialize>(record: &T) -> StoreResult<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Storage(format!("expected an object, got {}", other))),
        Err(e) => Err(StoreError::Storage(format!("encode document: {}", e))),
    }
}

pub fn from_document<T: for<'de> Deserialize<'de>>(doc: &Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(doc.clone()))
}

/// Owner field shared by every per-user document
pub fn owned_by(doc: &Document, owner: &OwnerId) -> bool {
    doc.get("userId").and_then(Value::as_str) == Some(owner.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_document_field_names() {
        let doc = to_document(&ItemDocument::new(&OwnerId::new("u1"), "Bolt", 5, "", 1_700_000_000_000)).unwrap();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 5);
        for key in ["name", "quantity", "category", "userId", "createdAt"] {
            assert!(keys.contains(&key), "missing {}", key);
        }
    }

    #[test]
    fn test_sparse_item_document_reads_back_defaults() {
        let doc = json!({ "name": "Nut", "category": null, "userId": "u1" });
        let Value::Object(doc) = doc else { panic!("object") };

        let item = from_document::<ItemDocument>(&doc).unwrap().into_item("abc");
        assert_eq!(item, Item::new("abc", "Nut", 0));
    }

    #[test]
    fn test_negative_quantity_is_clamped() {
        let doc = json!({ "name": "Nut", "quantity": -4, "userId": "u1" });
        let Value::Object(doc) = doc else { panic!("object") };

        let item = from_document::<ItemDocument>(&doc).unwrap().into_item("abc");
        assert_eq!(item.quantity, 0);
    }

    #[test]
    fn test_category_doc_id() {
        assert_eq!(CategoryDocument::doc_id("Tools", &OwnerId::new("u1")), "Tools_u1");
    }
}
