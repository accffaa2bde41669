//! Inventory Client
//!
//! One signed-in session wired together: a Store Adapter, the two change
//! streams feeding the engine, the dispatcher and the migration
//! coordinator.

use std::path::Path;
use std::sync::Arc;

use crate::account::{record_profile, ProfileOutcome};
use crate::config::{load_config, mark_migrated};
use crate::domain::{DomainError, DomainResult, OwnerId};
use crate::repository::{CategoryStore, InventoryStore, StoreAdapter};
use crate::session::{Session, SessionState};
use crate::sync::{
    ChangeStream, MigrationCoordinator, MigrationGate, MigrationReport, MutationDispatcher, ProjectionEngine,
    SelectionTracker,
};

pub struct InventoryClient {
    store: Arc<dyn StoreAdapter>,
    session: Arc<SessionState>,
    engine: ProjectionEngine,
    dispatcher: MutationDispatcher,
    migration: MigrationCoordinator,
    streams: Vec<ChangeStream>,
}

impl InventoryClient {
    /// Subscribe to both collections for the signed-in user
    pub async fn connect(store: Arc<dyn StoreAdapter>, session: Arc<SessionState>) -> DomainResult<Self> {
        let owner = session.current_user_id().ok_or(DomainError::NotAuthenticated)?;

        let selection = Arc::new(SelectionTracker::new());
        let engine = ProjectionEngine::new(selection);
        let gate = Arc::new(MigrationGate::new());
        let as_session: Arc<dyn Session> = session.clone();

        let dispatcher = MutationDispatcher::new(store.clone(), as_session.clone(), engine.clone(), gate.clone());
        let migration = MigrationCoordinator::new(store.clone(), as_session, gate);

        let mut client = Self {
            store,
            session,
            engine,
            dispatcher,
            migration,
            streams: Vec::new(),
        };
        client.subscribe(&owner).await?;
        Ok(client)
    }

    async fn subscribe(&mut self, owner: &OwnerId) -> DomainResult<()> {
        let items = self
            .store
            .subscribe_items(owner)
            .await
            .map_err(|e| DomainError::from_store("subscribe_items", owner.as_str(), e))?;
        let categories = self
            .store
            .subscribe_categories(owner)
            .await
            .map_err(|e| DomainError::from_store("subscribe_categories", owner.as_str(), e))?;

        self.streams = vec![
            ChangeStream::spawn_items(self.engine.clone(), items),
            ChangeStream::spawn_categories(self.engine.clone(), categories),
        ];
        tracing::info!("listening for changes as {}", owner);
        Ok(())
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    pub fn selection(&self) -> &Arc<SelectionTracker> {
        self.engine.selection()
    }

    pub fn dispatcher(&self) -> &MutationDispatcher {
        &self.dispatcher
    }

    pub fn migration(&self) -> &MigrationCoordinator {
        &self.migration
    }

    pub fn store(&self) -> &Arc<dyn StoreAdapter> {
        &self.store
    }

    pub fn is_listening(&self) -> bool {
        !self.streams.is_empty() && self.streams.iter().all(ChangeStream::is_active)
    }

    /// Record the profile document after sign-up
    pub async fn record_profile(&self, email: &str) -> DomainResult<ProfileOutcome> {
        let owner = self.session.current_user_id().ok_or(DomainError::NotAuthenticated)?;
        Ok(record_profile(self.store.as_ref(), &owner, email).await)
    }

    /// Stop both streams; safe to call repeatedly
    pub fn disconnect(&self) {
        for stream in &self.streams {
            stream.unsubscribe();
        }
    }

    /// Disconnect, drop all view state, and end the session
    pub fn sign_out(&self) {
        self.disconnect();
        self.engine.selection().clear();
        self.engine.reset();
        self.session.sign_out();
    }

    /// Run the automatic local migration once per data directory
    ///
    /// Returns `None` when it already ran or there was nothing to move.
    pub async fn migrate_once(
        &self,
        local: &dyn StoreAdapter,
        data_dir: &Path,
    ) -> DomainResult<Option<MigrationReport>> {
        let config = load_config(data_dir)?;
        if config.migration_completed {
            tracing::debug!("local migration already completed");
            return Ok(None);
        }

        let owner = self.session.current_user_id().ok_or(DomainError::NotAuthenticated)?;
        let items = local
            .load_items(&owner)
            .await
            .map_err(|e| DomainError::from_store("load_items", "local store", e))?;

        let report = if items.is_empty() {
            None
        } else {
            Some(self.migration.migrate(&items).await?)
        };
        mark_migrated(data_dir)?;
        Ok(report)
    }
}
