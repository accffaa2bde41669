//! Snapshot listener bookkeeping shared by both stores

use tokio::sync::mpsc;

use super::traits::SnapshotStream;
use crate::domain::{OwnerId, StoreResult};

/// Per-owner snapshot listeners of one collection
pub(crate) struct Subscribers<T> {
    listeners: Vec<(OwnerId, mpsc::UnboundedSender<StoreResult<Vec<T>>>)>,
}

impl<T: Clone> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    /// Register a listener and hand it the current snapshot
    pub(crate) fn add(&mut self, owner: &OwnerId, initial: Vec<T>) -> SnapshotStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh channel cannot be closed yet
        let _ = tx.send(Ok(initial));
        self.listeners.push((owner.clone(), tx));
        rx
    }

    /// Owners that still have a live listener
    pub(crate) fn owners(&mut self) -> Vec<OwnerId> {
        self.listeners.retain(|(_, tx)| !tx.is_closed());
        let mut owners: Vec<OwnerId> = self.listeners.iter().map(|(o, _)| o.clone()).collect();
        owners.sort();
        owners.dedup();
        owners
    }

    pub(crate) fn publish(&mut self, owner: &OwnerId, snapshot: &[T]) {
        self.listeners
            .retain(|(o, tx)| o != owner || tx.send(Ok(snapshot.to_vec())).is_ok());
    }

    /// Push an error to every listener without dropping them
    pub(crate) fn publish_error(&mut self, error: &crate::domain::StoreError) {
        self.listeners.retain(|(_, tx)| tx.send(Err(error.clone())).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&mut self) -> usize {
        self.listeners.retain(|(_, tx)| !tx.is_closed());
        self.listeners.len()
    }
}
