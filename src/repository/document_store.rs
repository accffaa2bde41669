//! Document Store
//!
//! Multi-device store of JSON documents in named collections, with
//! per-owner snapshot listeners and atomic commits. Every commit is staged
//! on a copy of the collections, persisted (when backed by a file), then
//! swapped in and pushed to listeners.
//!
//! Clones share the same underlying store, which is how several devices
//! observe each other's writes.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::documents::{
    from_document, owned_by, to_document, CategoryDocument, Document, ItemDocument, ProfileDocument,
    CATEGORIES, INVENTORY, USERS,
};
use super::subscribers::Subscribers;
use super::traits::{CategoryStore, InventoryStore, ProfileStore, SnapshotStream};
use crate::domain::{Category, Item, ItemDraft, ItemId, ItemPatch, OwnerId, StoreError, StoreResult};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

struct DocumentState {
    collections: Collections,
    path: Option<PathBuf>,
    reachable: bool,
    sequence: u64,
    items: Subscribers<Item>,
    categories: Subscribers<Category>,
}

/// Document store shared between devices
#[derive(Clone)]
pub struct DocumentStore {
    state: Arc<Mutex<DocumentState>>,
}

impl DocumentStore {
    fn with_collections(collections: Collections, path: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DocumentState {
                collections,
                path,
                reachable: true,
                sequence: 0,
                items: Subscribers::new(),
                categories: Subscribers::new(),
            })),
        }
    }

    pub fn in_memory() -> Self {
        Self::with_collections(Collections::new(), None)
    }

    /// Open a store whose documents are cached in a JSON file
    pub fn open(path: &Path) -> StoreResult<Self> {
        let collections = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| StoreError::Storage(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::Storage(format!("parse {}: {}", path.display(), e)))?
        } else {
            Collections::new()
        };
        Ok(Self::with_collections(collections, Some(path.to_path_buf())))
    }

    /// Simulate losing or regaining the connection
    ///
    /// While unreachable, writes fail and listeners receive an error.
    /// Regaining the connection pushes fresh snapshots.
    pub async fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.lock().await;
        if state.reachable == reachable {
            return;
        }
        state.reachable = reachable;
        if reachable {
            tracing::info!("document store reachable again");
            state.publish_items();
            state.publish_categories();
        } else {
            tracing::warn!("document store unreachable");
            let error = StoreError::Unavailable("document store offline".to_string());
            state.items.publish_error(&error);
            state.categories.publish_error(&error);
        }
    }

    /// Raw document, for inspection
    pub async fn document(&self, collection: &str, doc_id: &str) -> Option<Document> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
    }

    /// Number of documents in a collection across all owners
    pub async fn count(&self, collection: &str) -> usize {
        let state = self.state.lock().await;
        state.collections.get(collection).map_or(0, BTreeMap::len)
    }
}

/// A staged change to one document
enum Write {
    Set(&'static str, String, Document),
    Delete(&'static str, String),
}

impl DocumentState {
    fn ensure_reachable(&self) -> StoreResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(StoreError::Unavailable("document store offline".to_string()))
        }
    }

    fn doc(&self, collection: &str, doc_id: &str) -> Option<&Document> {
        self.collections.get(collection).and_then(|docs| docs.get(doc_id))
    }

    /// Auto-generated document id, 20 hex characters
    fn next_doc_id(&mut self, owner: &OwnerId) -> String {
        self.sequence += 1;
        let seed = format!(
            "{}:{}:{}",
            owner,
            self.sequence,
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        blake3::hash(seed.as_bytes()).to_hex().as_str()[..20].to_string()
    }

    /// Apply all writes or none of them
    fn commit(&mut self, writes: Vec<Write>) -> StoreResult<()> {
        self.ensure_reachable()?;

        let mut staged = self.collections.clone();
        for write in writes {
            match write {
                Write::Set(collection, doc_id, doc) => {
                    staged.entry(collection.to_string()).or_default().insert(doc_id, doc);
                }
                Write::Delete(collection, doc_id) => {
                    if let Some(docs) = staged.get_mut(collection) {
                        docs.remove(&doc_id);
                    }
                }
            }
        }

        if let Some(path) = &self.path {
            persist(path, &staged)?;
        }
        self.collections = staged;
        Ok(())
    }

    fn items_for(&self, owner: &OwnerId) -> Vec<Item> {
        let Some(docs) = self.collections.get(INVENTORY) else {
            return Vec::new();
        };
        docs.iter()
            .filter(|(_, doc)| owned_by(doc, owner))
            .filter_map(|(doc_id, doc)| match from_document::<ItemDocument>(doc) {
                Ok(record) => Some(record.into_item(doc_id)),
                Err(e) => {
                    tracing::warn!(doc_id = %doc_id, "skipping malformed inventory document: {}", e);
                    None
                }
            })
            .collect()
    }

    fn categories_for(&self, owner: &OwnerId) -> Vec<Category> {
        let Some(docs) = self.collections.get(CATEGORIES) else {
            return Vec::new();
        };
        docs.iter()
            .filter(|(_, doc)| owned_by(doc, owner))
            .filter_map(|(doc_id, doc)| match from_document::<CategoryDocument>(doc) {
                Ok(record) if !record.name.is_empty() => Some(record.into_category()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(doc_id = %doc_id, "skipping malformed category document: {}", e);
                    None
                }
            })
            .collect()
    }

    fn publish_items(&mut self) {
        for owner in self.items.owners() {
            let snapshot = self.items_for(&owner);
            self.items.publish(&owner, &snapshot);
        }
    }

    fn publish_categories(&mut self) {
        for owner in self.categories.owners() {
            let snapshot = self.categories_for(&owner);
            self.categories.publish(&owner, &snapshot);
        }
    }

    /// Owned inventory document, or `NotFound`
    fn owned_item(&self, owner: &OwnerId, doc_id: &str) -> StoreResult<&Document> {
        self.doc(INVENTORY, doc_id)
            .filter(|doc| owned_by(doc, owner))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", INVENTORY, doc_id)))
    }
}

fn persist(path: &Path, collections: &Collections) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(collections)
        .map_err(|e| StoreError::Storage(format!("encode cache: {}", e)))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content).map_err(|e| StoreError::Storage(format!("write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Storage(format!("replace {}: {}", path.display(), e)))
}

fn doc_id_of(id: &ItemId) -> String {
    id.to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl InventoryStore for DocumentStore {
    async fn insert_item(&self, owner: &OwnerId, draft: &ItemDraft) -> StoreResult<Item> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;

        let doc_id = state.next_doc_id(owner);
        let record = ItemDocument::new(owner, &draft.name, draft.quantity, &draft.category, now_millis());
        let doc = to_document(&record)?;
        state.commit(vec![Write::Set(INVENTORY, doc_id.clone(), doc)])?;

        state.publish_items();
        Ok(record.into_item(&doc_id))
    }

    async fn update_item(&self, owner: &OwnerId, id: &ItemId, patch: &ItemPatch) -> StoreResult<Item> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;

        let doc_id = doc_id_of(id);
        let mut doc = state.owned_item(owner, &doc_id)?.clone();
        let changed = !patch.is_empty();
        if let Some(name) = &patch.name {
            doc.insert("name".to_string(), json!(name));
        }
        if let Some(quantity) = patch.quantity {
            doc.insert("quantity".to_string(), json!(quantity));
        }
        if let Some(category) = &patch.category {
            doc.insert("category".to_string(), json!(category));
        }

        let item = from_document::<ItemDocument>(&doc)
            .map_err(|e| StoreError::Storage(format!("decode {}: {}", doc_id, e)))?
            .into_item(&doc_id);
        if changed {
            state.commit(vec![Write::Set(INVENTORY, doc_id, doc)])?;
            state.publish_items();
        }
        Ok(item)
    }

    async fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;

        let doc_id = doc_id_of(id);
        match state.doc(INVENTORY, &doc_id) {
            // Deleting a missing document succeeds
            None => return Ok(()),
            Some(doc) if !owned_by(doc, owner) => {
                return Err(StoreError::NotFound(format!("{}/{}", INVENTORY, doc_id)));
            }
            Some(_) => {}
        }
        state.commit(vec![Write::Delete(INVENTORY, doc_id)])?;

        state.publish_items();
        Ok(())
    }

    async fn load_items(&self, owner: &OwnerId) -> StoreResult<Vec<Item>> {
        let state = self.state.lock().await;
        Ok(state.items_for(owner))
    }

    async fn batch_write_items(&self, owner: &OwnerId, items: &[Item]) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        let created_at = now_millis();
        let writes = items
            .iter()
            .map(|item| {
                let doc_id = doc_id_of(&item.id);
                // Another owner's document is never overwritten; the batch fails whole
                if state.doc(INVENTORY, &doc_id).is_some_and(|doc| !owned_by(doc, owner)) {
                    return Err(StoreError::Conflict(format!(
                        "{}/{} belongs to another user",
                        INVENTORY, doc_id
                    )));
                }
                let record = ItemDocument::new(owner, &item.name, item.quantity, &item.category, created_at);
                Ok(Write::Set(INVENTORY, doc_id, to_document(&record)?))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        state.commit(writes)?;

        state.publish_items();
        Ok(())
    }

    async fn subscribe_items(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Item>> {
        let mut state = self.state.lock().await;
        let initial = state.items_for(owner);
        Ok(state.items.add(owner, initial))
    }
}

#[async_trait]
impl CategoryStore for DocumentStore {
    async fn insert_category(&self, owner: &OwnerId, name: &str) -> StoreResult<Category> {
        let mut state = self.state.lock().await;
        state.ensure_reachable()?;

        let doc_id = CategoryDocument::doc_id(name, owner);
        if state.doc(CATEGORIES, &doc_id).is_some() {
            return Err(StoreError::Conflict(format!("category {} already exists", name)));
        }
        let record = CategoryDocument {
            name: name.to_string(),
            user_id: owner.to_string(),
            created_at: Some(now_millis()),
        };
        state.commit(vec![Write::Set(CATEGORIES, doc_id, to_document(&record)?)])?;

        state.publish_categories();
        Ok(record.into_category())
    }

    async fn load_categories(&self, owner: &OwnerId) -> StoreResult<Vec<Category>> {
        let state = self.state.lock().await;
        Ok(state.categories_for(owner))
    }

    async fn subscribe_categories(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Category>> {
        let mut state = self.state.lock().await;
        let initial = state.categories_for(owner);
        Ok(state.categories.add(owner, initial))
    }
}

#[async_trait]
impl ProfileStore for DocumentStore {
    async fn write_profile(&self, owner: &OwnerId, email: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        let record = ProfileDocument {
            email: email.to_string(),
            created_at: now_millis(),
        };
        state.commit(vec![Write::Set(USERS, owner.to_string(), to_document(&record)?)])
    }
}

#[cfg(test)]
impl DocumentStore {
    /// Store a document exactly as given, bypassing record encoding
    pub(crate) async fn put_raw(&self, collection: &'static str, doc_id: &str, doc: Document) {
        let mut state = self.state.lock().await;
        state
            .commit(vec![Write::Set(collection, doc_id.to_string(), doc)])
            .expect("commit raw document");
        state.publish_items();
        state.publish_categories();
    }
}
