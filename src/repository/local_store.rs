//! Local Store
//!
//! SQLite-backed Store Adapter. Rows written before per-user scoping
//! (empty `owner_id`) are visible to every owner.
//! Snapshots are pushed to subscribers after every committed write.

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::db::{open_db, open_in_memory_db};
use super::subscribers::Subscribers;
use super::traits::{CategoryStore, InventoryStore, ProfileStore, SnapshotStream};
use crate::domain::{Category, Item, ItemDraft, ItemId, ItemPatch, OwnerId, StoreError, StoreResult};

struct LocalState {
    conn: Connection,
    items: Subscribers<Item>,
    categories: Subscribers<Category>,
}

/// SQLite implementation of the Store Adapter
#[derive(Clone)]
pub struct SqliteStore {
    state: Arc<Mutex<LocalState>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            state: Arc::new(Mutex::new(LocalState {
                conn,
                items: Subscribers::new(),
                categories: Subscribers::new(),
            })),
        }
    }

    /// Open (or create) the database file
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_in_memory_db()?))
    }
}

fn storage(context: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| StoreError::Storage(format!("{}: {}", context, e))
}

fn local_id(id: &ItemId) -> StoreResult<i64> {
    match id {
        ItemId::Local(id) => Ok(*id),
        ItemId::Remote(id) => Err(StoreError::NotFound(format!("inventory/{}", id))),
    }
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    let quantity: i64 = row.get(2)?;
    Ok(Item {
        id: ItemId::Local(row.get(0)?),
        name: row.get(1)?,
        quantity: quantity.clamp(0, i64::from(u32::MAX)) as u32,
        category: row.get(3)?,
    })
}

const SELECT_ITEMS: &str = "SELECT id, COALESCE(item_name, ''), COALESCE(quantity, 0), COALESCE(category_name, '')
     FROM inventory WHERE (owner_id = ?1 OR owner_id = '')";

fn query_items(conn: &Connection, owner: &OwnerId) -> StoreResult<Vec<Item>> {
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY id", SELECT_ITEMS))
        .map_err(storage("list items"))?;
    let rows = stmt
        .query_map(params![owner.as_str()], row_to_item)
        .map_err(storage("list items"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("read item"))
}

fn query_item(conn: &Connection, owner: &OwnerId, id: i64) -> StoreResult<Option<Item>> {
    conn.query_row(
        &format!("{} AND id = ?2", SELECT_ITEMS),
        params![owner.as_str(), id],
        row_to_item,
    )
    .optional()
    .map_err(storage("find item"))
}

fn query_categories(conn: &Connection, owner: &OwnerId) -> StoreResult<Vec<Category>> {
    let mut stmt = conn
        .prepare(
            "SELECT category_name FROM categories
             WHERE (owner_id = ?1 OR owner_id = '') AND category_name IS NOT NULL AND category_name != ''
             ORDER BY id",
        )
        .map_err(storage("list categories"))?;
    let rows = stmt
        .query_map(params![owner.as_str()], |row| Ok(Category::new(row.get::<_, String>(0)?)))
        .map_err(storage("list categories"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("read category"))
}

fn null_if_empty(category: &str) -> Option<&str> {
    (!category.is_empty()).then_some(category)
}

impl LocalState {
    fn publish_items(&mut self) {
        for owner in self.items.owners() {
            match query_items(&self.conn, &owner) {
                Ok(snapshot) => self.items.publish(&owner, &snapshot),
                Err(e) => self.items.publish_error(&e),
            }
        }
    }

    fn publish_categories(&mut self) {
        for owner in self.categories.owners() {
            match query_categories(&self.conn, &owner) {
                Ok(snapshot) => self.categories.publish(&owner, &snapshot),
                Err(e) => self.categories.publish_error(&e),
            }
        }
    }
}

#[async_trait]
impl InventoryStore for SqliteStore {
    async fn insert_item(&self, owner: &OwnerId, draft: &ItemDraft) -> StoreResult<Item> {
        let mut state = self.state.lock().await;

        state
            .conn
            .execute(
                "INSERT INTO inventory (item_name, quantity, category_name, owner_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    draft.name,
                    i64::from(draft.quantity),
                    null_if_empty(&draft.category),
                    owner.as_str()
                ],
            )
            .map_err(storage("insert item"))?;

        let item = Item {
            id: ItemId::Local(state.conn.last_insert_rowid()),
            name: draft.name.clone(),
            quantity: draft.quantity,
            category: draft.category.clone(),
        };
        state.publish_items();
        Ok(item)
    }

    async fn update_item(&self, owner: &OwnerId, id: &ItemId, patch: &ItemPatch) -> StoreResult<Item> {
        let row_id = local_id(id)?;
        let mut state = self.state.lock().await;

        let mut item = query_item(&state.conn, owner, row_id)?
            .ok_or_else(|| StoreError::NotFound(format!("inventory/{}", row_id)))?;
        if patch.is_empty() {
            return Ok(item);
        }
        patch.apply_to(&mut item);

        state
            .conn
            .execute(
                "UPDATE inventory SET item_name = ?1, quantity = ?2, category_name = ?3 WHERE id = ?4",
                params![item.name, i64::from(item.quantity), null_if_empty(&item.category), row_id],
            )
            .map_err(storage("update item"))?;

        state.publish_items();
        Ok(item)
    }

    async fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> StoreResult<()> {
        let row_id = local_id(id)?;
        let mut state = self.state.lock().await;

        let deleted = state
            .conn
            .execute(
                "DELETE FROM inventory WHERE id = ?1 AND (owner_id = ?2 OR owner_id = '')",
                params![row_id, owner.as_str()],
            )
            .map_err(storage("delete item"))?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("inventory/{}", row_id)));
        }

        state.publish_items();
        Ok(())
    }

    async fn load_items(&self, owner: &OwnerId) -> StoreResult<Vec<Item>> {
        let state = self.state.lock().await;
        query_items(&state.conn, owner)
    }

    async fn batch_write_items(&self, owner: &OwnerId, items: &[Item]) -> StoreResult<()> {
        let mut state = self.state.lock().await;

        {
            let tx = state.conn.transaction().map_err(storage("begin batch"))?;
            for item in items {
                let row_id = match &item.id {
                    ItemId::Local(id) => *id,
                    ItemId::Remote(id) => id
                        .parse::<i64>()
                        .map_err(|_| StoreError::Storage(format!("batch write: {} is not a row id", id)))?,
                };
                tx.execute(
                    "INSERT OR REPLACE INTO inventory (id, item_name, quantity, category_name, owner_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row_id,
                        item.name,
                        i64::from(item.quantity),
                        null_if_empty(&item.category),
                        owner.as_str()
                    ],
                )
                .map_err(storage("batch write"))?;
            }
            tx.commit().map_err(storage("commit batch"))?;
        }

        state.publish_items();
        Ok(())
    }

    async fn subscribe_items(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Item>> {
        let mut state = self.state.lock().await;
        let initial = query_items(&state.conn, owner)?;
        Ok(state.items.add(owner, initial))
    }
}

#[async_trait]
impl CategoryStore for SqliteStore {
    async fn insert_category(&self, owner: &OwnerId, name: &str) -> StoreResult<Category> {
        let mut state = self.state.lock().await;

        state
            .conn
            .execute(
                "INSERT INTO categories (category_name, owner_id) VALUES (?1, ?2)",
                params![name, owner.as_str()],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
                    StoreError::Conflict(format!("category {} already exists", name))
                }
                e => StoreError::Storage(format!("insert category: {}", e)),
            })?;

        state.publish_categories();
        Ok(Category::new(name))
    }

    async fn load_categories(&self, owner: &OwnerId) -> StoreResult<Vec<Category>> {
        let state = self.state.lock().await;
        query_categories(&state.conn, owner)
    }

    async fn subscribe_categories(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Category>> {
        let mut state = self.state.lock().await;
        let initial = query_categories(&state.conn, owner)?;
        Ok(state.categories.add(owner, initial))
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn write_profile(&self, owner: &OwnerId, _email: &str) -> StoreResult<()> {
        // Local accounts keep no profile records
        tracing::debug!(owner = %owner, "local store skips profile write");
        Ok(())
    }
}
