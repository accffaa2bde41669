//! Mutation Dispatcher
//!
//! Validates user intents and issues them against the Store Adapter. An
//! acknowledged write is applied to the engine right away as a
//! confirmation, unless a snapshot delivered while the write was in flight
//! already changed that record. The store's later echo re-applies
//! harmlessly.

use std::sync::Arc;

use super::change_stream::{Confirmation, Mutation};
use super::migration::MigrationGate;
use super::projection::ProjectionEngine;
use crate::domain::{
    validate_name, validate_quantity, Category, DomainError, DomainResult, Item, ItemDraft, ItemId, ItemPatch,
    OwnerId, ALL_CATEGORIES,
};
use crate::repository::{CategoryStore, InventoryStore, StoreAdapter};
use crate::session::Session;

/// Per-item outcome of a category assignment
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssignmentReport {
    pub succeeded: Vec<ItemId>,
    pub failed: Vec<(ItemId, DomainError)>,
}

impl AssignmentReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn error_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MutationDispatcher {
    store: Arc<dyn StoreAdapter>,
    session: Arc<dyn Session>,
    engine: ProjectionEngine,
    gate: Arc<MigrationGate>,
}

impl MutationDispatcher {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        session: Arc<dyn Session>,
        engine: ProjectionEngine,
        gate: Arc<MigrationGate>,
    ) -> Self {
        Self {
            store,
            session,
            engine,
            gate,
        }
    }

    /// Current owner, refusing while a migration runs
    fn owner(&self) -> DomainResult<OwnerId> {
        let owner = self.session.current_user_id().ok_or(DomainError::NotAuthenticated)?;
        if self.gate.in_progress() {
            return Err(DomainError::MigrationInProgress);
        }
        Ok(owner)
    }

    fn confirm(&self, confirmation: Confirmation, since: u64) {
        self.engine.confirm(Mutation::from(confirmation), since);
    }

    pub async fn add_item(&self, name: &str, quantity: i64) -> DomainResult<Item> {
        let owner = self.owner()?;
        let draft = ItemDraft::new(name, quantity)?;

        let _permit = self.gate.write_permit().await?;
        let since = self.engine.snapshot_mark();
        let item = self
            .store
            .insert_item(&owner, &draft)
            .await
            .map_err(|e| DomainError::from_store("add_item", draft.name.as_str(), e))?;

        tracing::info!("added item {} ({})", item.name, item.id);
        self.confirm(Confirmation::ItemWritten(item.clone()), since);
        Ok(item)
    }

    /// Replace name and quantity; the category is left as stored
    pub async fn update_item(&self, id: &ItemId, name: &str, quantity: i64) -> DomainResult<Item> {
        let owner = self.owner()?;
        let patch = ItemPatch::details(validate_name(name)?, validate_quantity(quantity)?);

        let _permit = self.gate.write_permit().await?;
        let since = self.engine.snapshot_mark();
        let item = self
            .store
            .update_item(&owner, id, &patch)
            .await
            .map_err(|e| DomainError::from_store("update_item", id.to_string(), e))?;

        tracing::info!("updated item {}", item.id);
        self.confirm(Confirmation::ItemWritten(item.clone()), since);
        Ok(item)
    }

    pub async fn delete_item(&self, id: &ItemId) -> DomainResult<()> {
        let owner = self.owner()?;

        let _permit = self.gate.write_permit().await?;
        let since = self.engine.snapshot_mark();
        self.store
            .delete_item(&owner, id)
            .await
            .map_err(|e| DomainError::from_store("delete_item", id.to_string(), e))?;

        tracing::info!("deleted item {}", id);
        self.confirm(Confirmation::ItemDeleted(id.clone()), since);
        Ok(())
    }

    /// Move every listed item into `category`, one independent write each
    pub async fn assign_category(&self, ids: &[ItemId], category: &str) -> DomainResult<AssignmentReport> {
        let owner = self.owner()?;
        if ids.is_empty() {
            return Err(DomainError::Validation("no items selected".to_string()));
        }
        if category == ALL_CATEGORIES {
            return Err(DomainError::Validation(format!("\"{}\" is not a category", ALL_CATEGORIES)));
        }
        if !self.engine.has_category(category) {
            return Err(DomainError::Validation(format!("unknown category {}", category)));
        }

        let _permit = self.gate.write_permit().await?;
        let patch = ItemPatch::category(category);
        let mut report = AssignmentReport::default();
        for id in ids {
            let since = self.engine.snapshot_mark();
            match self.store.update_item(&owner, id, &patch).await {
                Ok(item) => {
                    self.confirm(Confirmation::ItemWritten(item), since);
                    report.succeeded.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!("assigning {} to {} failed: {}", id, category, e);
                    report
                        .failed
                        .push((id.clone(), DomainError::from_store("assign_category", id.to_string(), e)));
                }
            }
        }

        tracing::info!(
            "assigned {} items to {} ({} failed)",
            report.success_count(),
            category,
            report.error_count()
        );
        Ok(report)
    }

    /// Assign the current selection, then clear it
    pub async fn assign_selected(&self, category: &str) -> DomainResult<AssignmentReport> {
        let selection = self.engine.selection();
        let ids: Vec<ItemId> = selection.selected().into_iter().collect();
        let report = self.assign_category(&ids, category).await?;
        selection.clear();
        Ok(report)
    }

    pub async fn add_category(&self, name: &str) -> DomainResult<Category> {
        let owner = self.owner()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("category name cannot be empty".to_string()));
        }
        if name.to_lowercase() == ALL_CATEGORIES.to_lowercase() {
            return Err(DomainError::Conflict(format!("category {} already exists", name)));
        }
        if let Some(existing) = self.engine.find_category_ignore_case(name) {
            return Err(DomainError::Conflict(format!("category {} already exists", existing)));
        }

        let _permit = self.gate.write_permit().await?;
        let since = self.engine.snapshot_mark();
        let category = self
            .store
            .insert_category(&owner, name)
            .await
            .map_err(|e| DomainError::from_store("add_category", name, e))?;

        tracing::info!("added category {}", category.name);
        self.confirm(Confirmation::CategoryWritten(category.clone()), since);
        Ok(category)
    }
}
