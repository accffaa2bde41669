//! Change Stream
//!
//! Normalizes the two kinds of input into ordered `Mutation`s:
//! - confirmations of writes this client issued
//! - full collection snapshots pushed by the store, diffed against the
//!   canonical set
//!
//! One listener task runs per collection; item and category streams are
//! independent and never wait on each other.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use super::projection::{ProjectionEngine, RecordKey};
use crate::domain::{Category, Collection, DomainError, Entity, Item, ItemId, StoreError, StoreResult};
use crate::repository::SnapshotStream;

/// A normalized change to the canonical sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Upserted(Item),
    Removed(ItemId),
    CategoryUpserted(String),
    CategoryRemoved(String),
    StreamError { collection: Collection, error: DomainError },
}

impl Mutation {
    pub fn collection(&self) -> Collection {
        match self {
            Mutation::Upserted(_) | Mutation::Removed(_) => Collection::Items,
            Mutation::CategoryUpserted(_) | Mutation::CategoryRemoved(_) => Collection::Categories,
            Mutation::StreamError { collection, .. } => *collection,
        }
    }

    /// Record this mutation touches; stream errors touch none
    pub fn key(&self) -> Option<RecordKey> {
        match self {
            Mutation::Upserted(item) => Some(RecordKey::Item(item.id.clone())),
            Mutation::Removed(id) => Some(RecordKey::Item(id.clone())),
            Mutation::CategoryUpserted(name) | Mutation::CategoryRemoved(name) => {
                Some(RecordKey::Category(name.clone()))
            }
            Mutation::StreamError { .. } => None,
        }
    }

    /// Error pushed by a store listener
    pub fn stream_error(collection: Collection, cause: StoreError) -> Self {
        Mutation::StreamError {
            collection,
            error: DomainError::StoreUnavailable {
                operation: "listen",
                target: collection.as_str().to_string(),
                cause,
            },
        }
    }
}

/// Acknowledged result of a write issued by this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    ItemWritten(Item),
    ItemDeleted(ItemId),
    CategoryWritten(Category),
}

impl From<Confirmation> for Mutation {
    fn from(confirmation: Confirmation) -> Self {
        match confirmation {
            Confirmation::ItemWritten(item) => Mutation::Upserted(item),
            Confirmation::ItemDeleted(id) => Mutation::Removed(id),
            Confirmation::CategoryWritten(category) => Mutation::CategoryUpserted(category.name),
        }
    }
}

/// Removed ids and new-or-changed records, each in id order
///
/// Duplicate ids within the snapshot: the last occurrence wins.
fn diff<T: Entity>(current: &BTreeMap<T::Id, T>, snapshot: Vec<T>) -> (Vec<T::Id>, Vec<T>) {
    let incoming: BTreeMap<T::Id, T> = snapshot.into_iter().map(|record| (record.id(), record)).collect();

    let removed = current
        .keys()
        .filter(|id| !incoming.contains_key(*id))
        .cloned()
        .collect();
    let upserted = incoming
        .into_iter()
        .filter(|(id, record)| current.get(id) != Some(record))
        .map(|(_, record)| record)
        .collect();

    (removed, upserted)
}

/// Mutations turning `current` into the item snapshot
pub fn diff_items(current: &BTreeMap<ItemId, Item>, snapshot: Vec<Item>) -> Vec<Mutation> {
    let (removed, upserted) = diff(current, snapshot);
    removed
        .into_iter()
        .map(Mutation::Removed)
        .chain(upserted.into_iter().map(Mutation::Upserted))
        .collect()
}

/// Mutations turning `current` into the category snapshot
pub fn diff_categories(current: &BTreeMap<String, Category>, snapshot: Vec<Category>) -> Vec<Mutation> {
    let (removed, upserted) = diff(current, snapshot);
    removed
        .into_iter()
        .map(Mutation::CategoryRemoved)
        .chain(upserted.into_iter().map(|c| Mutation::CategoryUpserted(c.name)))
        .collect()
}

/// Feed one pushed item snapshot (or error) into the engine
pub fn ingest_items(engine: &ProjectionEngine, snapshot: StoreResult<Vec<Item>>) -> Vec<Mutation> {
    match snapshot {
        Ok(items) => engine.apply_snapshot(|canonical| diff_items(canonical.items(), items)),
        Err(cause) => {
            tracing::warn!("item stream error, keeping last known state: {}", cause);
            let mutation = Mutation::stream_error(Collection::Items, cause);
            engine.apply(mutation.clone());
            vec![mutation]
        }
    }
}

/// Feed one pushed category snapshot (or error) into the engine
pub fn ingest_categories(engine: &ProjectionEngine, snapshot: StoreResult<Vec<Category>>) -> Vec<Mutation> {
    match snapshot {
        Ok(categories) => engine.apply_snapshot(|canonical| diff_categories(canonical.categories(), categories)),
        Err(cause) => {
            tracing::warn!("category stream error, keeping last known state: {}", cause);
            let mutation = Mutation::stream_error(Collection::Categories, cause);
            engine.apply(mutation.clone());
            vec![mutation]
        }
    }
}

/// Running listener for one collection
///
/// After `unsubscribe` returns, nothing more from this stream reaches the
/// engine. Dropping the handle unsubscribes.
pub struct ChangeStream {
    collection: Collection,
    active: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl ChangeStream {
    pub fn spawn_items(engine: ProjectionEngine, stream: SnapshotStream<Item>) -> Self {
        Self::spawn(Collection::Items, stream, move |snapshot| {
            ingest_items(&engine, snapshot);
        })
    }

    pub fn spawn_categories(engine: ProjectionEngine, stream: SnapshotStream<Category>) -> Self {
        Self::spawn(Collection::Categories, stream, move |snapshot| {
            ingest_categories(&engine, snapshot);
        })
    }

    fn spawn<T, F>(collection: Collection, mut stream: SnapshotStream<T>, ingest: F) -> Self
    where
        T: Send + 'static,
        F: Fn(StoreResult<Vec<T>>) + Send + 'static,
    {
        let active = Arc::new(Mutex::new(true));
        let gate = active.clone();

        let task = tokio::spawn(async move {
            while let Some(snapshot) = stream.recv().await {
                // Checked and applied under the gate so unsubscribe cannot interleave
                let open = gate.lock().unwrap_or_else(PoisonError::into_inner);
                if !*open {
                    break;
                }
                ingest(snapshot);
                drop(open);
            }
            tracing::debug!(collection = collection.as_str(), "change stream ended");
        });

        Self {
            collection,
            active,
            task,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) && !self.task.is_finished()
    }

    /// Stop delivering events; safe to call repeatedly
    pub fn unsubscribe(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active {
            *active = false;
            tracing::debug!(collection = self.collection.as_str(), "change stream unsubscribed");
        }
        drop(active);
        self.task.abort();
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
