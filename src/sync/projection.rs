//! Projection Engine
//!
//! Owns the canonical item and category sets and derives the displayed view
//! from them on demand. Views are never mutated directly; every change goes
//! through `apply` or `apply_with`, and the selection is reconciled before
//! observers hear about it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::change_stream::Mutation;
use super::selection::SelectionTracker;
use crate::domain::{Category, Collection, DomainError, Item, ItemId, ALL_CATEGORIES};

const EVENT_CAPACITY: usize = 64;

/// Which items a view shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Named(String),
}

impl CategoryFilter {
    /// Map a filter label; "All" selects everything
    pub fn parse(label: &str) -> Self {
        if label == ALL_CATEGORIES {
            CategoryFilter::All
        } else {
            CategoryFilter::Named(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CategoryFilter::All => ALL_CATEGORIES,
            CategoryFilter::Named(name) => name,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => item.category == *name,
        }
    }
}

/// Display order; ties always break on ascending id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    NameAscending,
    NameDescending,
    QuantityAscending,
    QuantityDescending,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::NameAscending,
        SortKey::NameDescending,
        SortKey::QuantityAscending,
        SortKey::QuantityDescending,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::NameAscending => "Sort by Name (A-Z)",
            SortKey::NameDescending => "Sort by Name (Z-A)",
            SortKey::QuantityAscending => "Sort by Quantity (Low to High)",
            SortKey::QuantityDescending => "Sort by Quantity (High to Low)",
        }
    }

    /// Sort option by its position in the picker
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Total order over items
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        let primary = match self {
            SortKey::NameAscending => compare_names(a, b),
            SortKey::NameDescending => compare_names(b, a),
            SortKey::QuantityAscending => a.quantity.cmp(&b.quantity),
            SortKey::QuantityDescending => b.quantity.cmp(&a.quantity),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

fn compare_names(a: &Item, b: &Item) -> Ordering {
    let a = a.name.chars().flat_map(char::to_lowercase);
    let b = b.name.chars().flat_map(char::to_lowercase);
    a.cmp(b)
}

/// Notification sent after the canonical state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Changed { version: u64, collection: Collection },
    StreamError { collection: Collection, error: DomainError },
}

/// Identity of one canonical record, across both collections
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordKey {
    Item(ItemId),
    Category(String),
}

/// The canonical item and category sets
#[derive(Debug, Clone, Default)]
pub struct Canonical {
    items: BTreeMap<ItemId, Item>,
    categories: BTreeMap<String, Category>,
    /// Bumped once per ingested store snapshot
    snapshot_seq: u64,
    /// Snapshot sequence at which a snapshot last changed each record
    changed_at: BTreeMap<RecordKey, u64>,
}

impl Canonical {
    pub fn items(&self) -> &BTreeMap<ItemId, Item> {
        &self.items
    }

    pub fn categories(&self) -> &BTreeMap<String, Category> {
        &self.categories
    }

    /// True when a snapshot ingested after `since` changed `key`
    fn changed_since(&self, key: &RecordKey, since: u64) -> bool {
        self.changed_at.get(key).is_some_and(|seq| *seq > since)
    }

    /// Returns true when the state actually changed
    fn apply(&mut self, mutation: &Mutation) -> bool {
        match mutation {
            Mutation::Upserted(item) => {
                if self.items.get(&item.id) == Some(item) {
                    return false;
                }
                self.items.insert(item.id.clone(), item.clone());
                true
            }
            Mutation::Removed(id) => self.items.remove(id).is_some(),
            Mutation::CategoryUpserted(name) => {
                if self.categories.contains_key(name) {
                    return false;
                }
                self.categories.insert(name.clone(), Category::new(name.as_str()));
                true
            }
            Mutation::CategoryRemoved(name) => self.categories.remove(name).is_some(),
            Mutation::StreamError { .. } => false,
        }
    }
}

struct EngineInner {
    canonical: RwLock<Canonical>,
    selection: Arc<SelectionTracker>,
    events: broadcast::Sender<ViewEvent>,
    version: AtomicU64,
}

/// Shared handle to the canonical state
#[derive(Clone)]
pub struct ProjectionEngine {
    inner: Arc<EngineInner>,
}

impl ProjectionEngine {
    pub fn new(selection: Arc<SelectionTracker>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                canonical: RwLock::new(Canonical::default()),
                selection,
                events,
                version: AtomicU64::new(0),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Canonical> {
        self.inner.canonical.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Canonical> {
        self.inner.canonical.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn selection(&self) -> &Arc<SelectionTracker> {
        &self.inner.selection
    }

    /// Apply one mutation; returns true when the canonical state changed
    pub fn apply(&self, mutation: Mutation) -> bool {
        self.apply_with(|_| vec![mutation])
            .iter()
            .any(|m| !matches!(m, Mutation::StreamError { .. }))
    }

    /// Compute mutations from the current state and apply them atomically
    ///
    /// Returns the mutations that took effect, plus any stream errors.
    pub fn apply_with(&self, diff: impl FnOnce(&Canonical) -> Vec<Mutation>) -> Vec<Mutation> {
        let canonical = self.write();
        let mutations = diff(&canonical);
        self.commit(canonical, mutations)
    }

    /// Apply a pushed store snapshot
    ///
    /// Every record the snapshot changes or removes is stamped with a fresh
    /// snapshot sequence.
    pub fn apply_snapshot(&self, diff: impl FnOnce(&Canonical) -> Vec<Mutation>) -> Vec<Mutation> {
        let mut canonical = self.write();
        let mutations = diff(&canonical);

        canonical.snapshot_seq += 1;
        let seq = canonical.snapshot_seq;
        for key in mutations.iter().filter_map(Mutation::key) {
            canonical.changed_at.insert(key, seq);
        }
        self.commit(canonical, mutations)
    }

    /// Sequence of the last ingested snapshot; take it before issuing a write
    pub fn snapshot_mark(&self) -> u64 {
        self.read().snapshot_seq
    }

    /// Apply an acknowledged write issued after `since`
    ///
    /// Dropped when a snapshot ingested since then already changed the
    /// record; that snapshot is at least as fresh as the acknowledgement.
    pub fn confirm(&self, mutation: Mutation, since: u64) -> bool {
        let canonical = self.write();
        if let Some(key) = mutation.key() {
            if canonical.changed_since(&key, since) {
                tracing::debug!("confirmation for {:?} superseded by a newer snapshot", key);
                return false;
            }
        }
        self.commit(canonical, vec![mutation])
            .iter()
            .any(|m| !matches!(m, Mutation::StreamError { .. }))
    }

    /// Apply `mutations`, reconcile the selection, and notify observers
    ///
    /// Events go out before the lock is released, so subscribers see
    /// versions in increasing order.
    fn commit(&self, mut canonical: RwLockWriteGuard<'_, Canonical>, mutations: Vec<Mutation>) -> Vec<Mutation> {
        let mut applied = Vec::with_capacity(mutations.len());
        let mut events = Vec::new();
        for mutation in mutations {
            if let Mutation::StreamError { collection, error } = &mutation {
                events.push(ViewEvent::StreamError {
                    collection: *collection,
                    error: error.clone(),
                });
                applied.push(mutation);
            } else if canonical.apply(&mutation) {
                applied.push(mutation);
            }
        }

        let mut changed: Vec<Collection> = Vec::new();
        for mutation in &applied {
            let collection = mutation.collection();
            if !matches!(mutation, Mutation::StreamError { .. }) && !changed.contains(&collection) {
                changed.push(collection);
            }
        }

        if !changed.is_empty() {
            if changed.contains(&Collection::Items) {
                let stale = self.inner.selection.retain_live(|id| canonical.items.contains_key(id));
                if !stale.is_empty() {
                    tracing::debug!("dropped {} stale selections", stale.len());
                }
            }
            let version = self.inner.version.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            events.extend(
                changed
                    .into_iter()
                    .map(|collection| ViewEvent::Changed { version, collection }),
            );
        }

        for event in events {
            // No receivers is fine
            let _ = self.inner.events.send(event);
        }
        drop(canonical);
        applied
    }

    /// Items matching the filter, in sort order
    pub fn project(&self, filter: &CategoryFilter, sort: SortKey) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .read()
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| sort.compare(a, b));
        items
    }

    /// Items whose name starts with `prefix`, in sort order
    pub fn search(&self, prefix: &str, sort: SortKey) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .read()
            .items
            .values()
            .filter(|item| item.name.starts_with(prefix))
            .cloned()
            .collect();
        items.sort_by(|a, b| sort.compare(a, b));
        items
    }

    /// Category names, sorted
    pub fn categories(&self) -> Vec<String> {
        self.read().categories.keys().cloned().collect()
    }

    /// Filter labels: "All" followed by every category
    pub fn category_options(&self) -> Vec<String> {
        std::iter::once(ALL_CATEGORIES.to_string())
            .chain(self.categories())
            .collect()
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.read().categories.contains_key(name)
    }

    /// Existing category equal to `name` ignoring case
    pub fn find_category_ignore_case(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        self.read()
            .categories
            .keys()
            .find(|existing| existing.to_lowercase() == wanted)
            .cloned()
    }

    pub fn item(&self, id: &ItemId) -> Option<Item> {
        self.read().items.get(id).cloned()
    }

    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.read().items.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// Increments once per state-changing apply
    pub fn version(&self) -> u64 {
        self.inner.version.load(AtomicOrdering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.inner.events.subscribe()
    }

    /// Forget everything, e.g. on sign-out
    pub fn reset(&self) {
        let mut canonical = self.write();
        canonical.changed_at.clear();
        let mutations: Vec<Mutation> = canonical
            .items
            .keys()
            .cloned()
            .map(Mutation::Removed)
            .chain(canonical.categories.keys().cloned().map(Mutation::CategoryRemoved))
            .collect();
        self.commit(canonical, mutations);
    }
}
