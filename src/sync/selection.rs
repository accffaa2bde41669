//! Selection Tracker
//!
//! Identifier-keyed set of checked items. Tracking ids rather than list
//! positions keeps the selection correct when the view is re-sorted or
//! re-filtered underneath it.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use crate::domain::ItemId;

#[derive(Debug, Default)]
pub struct SelectionTracker {
    selected: Mutex<BTreeSet<ItemId>>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<ItemId>> {
        self.selected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flip the selection state; returns true when now selected
    pub fn toggle(&self, id: &ItemId) -> bool {
        let mut selected = self.lock();
        if selected.remove(id) {
            false
        } else {
            selected.insert(id.clone());
            true
        }
    }

    pub fn selected(&self) -> BTreeSet<ItemId> {
        self.lock().clone()
    }

    pub fn is_selected(&self, id: &ItemId) -> bool {
        self.lock().contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every selected id that is not in the canonical set
    pub fn reconcile(&self, canonical: &BTreeSet<ItemId>) -> Vec<ItemId> {
        self.retain_live(|id| canonical.contains(id))
    }

    /// Drop every selected id for which `is_live` is false; returns the dropped ids
    pub fn retain_live(&self, is_live: impl Fn(&ItemId) -> bool) -> Vec<ItemId> {
        let mut selected = self.lock();
        let stale: Vec<ItemId> = selected.iter().filter(|id| !is_live(id)).cloned().collect();
        for id in &stale {
            selected.remove(id);
        }
        stale
    }
}
