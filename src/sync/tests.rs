//! Synchronization Scenario Tests
//!
//! Whole-client flows over the document store: confirmations and echoes,
//! a second device, outages, partial assignment failures and migration.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::client::InventoryClient;
    use crate::config::load_config;
    use crate::domain::{
        Category, Collection, DomainError, Item, ItemDraft, ItemId, ItemPatch, OwnerId, StoreError, StoreResult,
    };
    use crate::repository::{
        open_db, CategoryStore, DocumentStore, InventoryStore, ProfileStore, SnapshotStream, SqliteStore,
        StoreAdapter, INVENTORY,
    };
    use crate::session::SessionState;
    use crate::sync::{CategoryFilter, SortKey, ViewEvent};

    /// Document store that rejects updates to chosen ids
    struct FlakyStore {
        inner: DocumentStore,
        failing: Mutex<BTreeSet<ItemId>>,
    }

    impl FlakyStore {
        fn new(inner: DocumentStore) -> Self {
            Self {
                inner,
                failing: Mutex::new(BTreeSet::new()),
            }
        }

        fn fail_updates_for(&self, id: ItemId) {
            self.failing.lock().unwrap().insert(id);
        }
    }

    #[async_trait]
    impl InventoryStore for FlakyStore {
        async fn insert_item(&self, owner: &OwnerId, draft: &ItemDraft) -> StoreResult<Item> {
            self.inner.insert_item(owner, draft).await
        }

        async fn update_item(&self, owner: &OwnerId, id: &ItemId, patch: &ItemPatch) -> StoreResult<Item> {
            if self.failing.lock().unwrap().contains(id) {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
            self.inner.update_item(owner, id, patch).await
        }

        async fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> StoreResult<()> {
            self.inner.delete_item(owner, id).await
        }

        async fn load_items(&self, owner: &OwnerId) -> StoreResult<Vec<Item>> {
            self.inner.load_items(owner).await
        }

        async fn batch_write_items(&self, owner: &OwnerId, items: &[Item]) -> StoreResult<()> {
            self.inner.batch_write_items(owner, items).await
        }

        async fn subscribe_items(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Item>> {
            self.inner.subscribe_items(owner).await
        }
    }

    #[async_trait]
    impl CategoryStore for FlakyStore {
        async fn insert_category(&self, owner: &OwnerId, name: &str) -> StoreResult<Category> {
            self.inner.insert_category(owner, name).await
        }

        async fn load_categories(&self, owner: &OwnerId) -> StoreResult<Vec<Category>> {
            self.inner.load_categories(owner).await
        }

        async fn subscribe_categories(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Category>> {
            self.inner.subscribe_categories(owner).await
        }
    }

    #[async_trait]
    impl ProfileStore for FlakyStore {
        async fn write_profile(&self, owner: &OwnerId, email: &str) -> StoreResult<()> {
            self.inner.write_profile(owner, email).await
        }
    }

    /// What another device does between our write landing and its ack
    #[derive(Clone, Copy)]
    enum Interference {
        Delete,
        Rename(&'static str),
    }

    /// Document store whose updates race a second device
    ///
    /// The update commits, the other device writes the same record, the
    /// listener gets time to deliver that, and only then does the ack return.
    struct RacyStore {
        inner: DocumentStore,
        interference: Interference,
    }

    #[async_trait]
    impl InventoryStore for RacyStore {
        async fn insert_item(&self, owner: &OwnerId, draft: &ItemDraft) -> StoreResult<Item> {
            self.inner.insert_item(owner, draft).await
        }

        async fn update_item(&self, owner: &OwnerId, id: &ItemId, patch: &ItemPatch) -> StoreResult<Item> {
            let acked = self.inner.update_item(owner, id, patch).await?;
            match self.interference {
                Interference::Delete => self.inner.delete_item(owner, id).await?,
                Interference::Rename(name) => {
                    let rename = ItemPatch {
                        name: Some(name.to_string()),
                        ..Default::default()
                    };
                    self.inner.update_item(owner, id, &rename).await?;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(acked)
        }

        async fn delete_item(&self, owner: &OwnerId, id: &ItemId) -> StoreResult<()> {
            self.inner.delete_item(owner, id).await
        }

        async fn load_items(&self, owner: &OwnerId) -> StoreResult<Vec<Item>> {
            self.inner.load_items(owner).await
        }

        async fn batch_write_items(&self, owner: &OwnerId, items: &[Item]) -> StoreResult<()> {
            self.inner.batch_write_items(owner, items).await
        }

        async fn subscribe_items(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Item>> {
            self.inner.subscribe_items(owner).await
        }
    }

    #[async_trait]
    impl CategoryStore for RacyStore {
        async fn insert_category(&self, owner: &OwnerId, name: &str) -> StoreResult<Category> {
            self.inner.insert_category(owner, name).await
        }

        async fn load_categories(&self, owner: &OwnerId) -> StoreResult<Vec<Category>> {
            self.inner.load_categories(owner).await
        }

        async fn subscribe_categories(&self, owner: &OwnerId) -> StoreResult<SnapshotStream<Category>> {
            self.inner.subscribe_categories(owner).await
        }
    }

    #[async_trait]
    impl ProfileStore for RacyStore {
        async fn write_profile(&self, owner: &OwnerId, email: &str) -> StoreResult<()> {
            self.inner.write_profile(owner, email).await
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("user-1")
    }

    fn session() -> Arc<SessionState> {
        Arc::new(SessionState::signed_in(owner()))
    }

    async fn connect(store: Arc<dyn StoreAdapter>) -> InventoryClient {
        InventoryClient::connect(store, session()).await.expect("connect")
    }

    /// Poll until `cond` holds or about a second has passed
    async fn eventually(cond: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_item_is_visible_once_after_echo() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;

        let bolt = client.dispatcher().add_item("  Bolt ", 5).await.unwrap();

        // Confirmation is applied before the echo arrives
        assert_eq!(client.engine().item(&bolt.id), Some(bolt.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(client.engine().len(), 1);
        assert_eq!(store.count(INVENTORY).await, 1);
        assert_eq!(bolt.name, "Bolt");
    }

    #[tokio::test]
    async fn test_projection_filters_by_category() {
        let client = connect(Arc::new(DocumentStore::in_memory())).await;
        let dispatcher = client.dispatcher();

        dispatcher.add_item("Bolt", 5).await.unwrap();
        let nut = dispatcher.add_item("Nut", 0).await.unwrap();
        dispatcher.add_category("Hardware").await.unwrap();
        let report = dispatcher.assign_category(&[nut.id.clone()], "Hardware").await.unwrap();
        assert_eq!(report.success_count(), 1);

        let engine = client.engine();
        assert_eq!(names(&engine.project(&CategoryFilter::parse("All"), SortKey::NameAscending)), vec!["Bolt", "Nut"]);
        assert_eq!(names(&engine.project(&CategoryFilter::parse("Hardware"), SortKey::NameAscending)), vec!["Nut"]);
        assert_eq!(engine.category_options(), vec!["All", "Hardware"]);
    }

    #[tokio::test]
    async fn test_second_device_changes_arrive() {
        let store = DocumentStore::in_memory();
        let phone = connect(Arc::new(store.clone())).await;
        let tablet = connect(Arc::new(store.clone())).await;

        let bolt = phone.dispatcher().add_item("Bolt", 5).await.unwrap();
        phone.dispatcher().add_category("Tools").await.unwrap();

        assert!(eventually(|| tablet.engine().item(&bolt.id).is_some()).await);
        assert!(eventually(|| tablet.engine().has_category("Tools")).await);

        phone.dispatcher().delete_item(&bolt.id).await.unwrap();
        assert!(eventually(|| tablet.engine().is_empty()).await);
    }

    #[tokio::test]
    async fn test_remote_delete_during_update_ack_wins() {
        let store = DocumentStore::in_memory();
        let racy = Arc::new(RacyStore {
            inner: store.clone(),
            interference: Interference::Delete,
        });
        let client = connect(racy).await;
        let bolt = client.dispatcher().add_item("Bolt", 5).await.unwrap();

        let acked = client.dispatcher().update_item(&bolt.id, "Hex bolt", 7).await.unwrap();
        assert_eq!(acked.name, "Hex bolt");

        assert_eq!(store.count(INVENTORY).await, 0);
        assert!(client.engine().item(&bolt.id).is_none());
        assert!(client.engine().is_empty());
    }

    #[tokio::test]
    async fn test_remote_edit_during_update_ack_wins() {
        let store = DocumentStore::in_memory();
        let racy = Arc::new(RacyStore {
            inner: store.clone(),
            interference: Interference::Rename("Carriage bolt"),
        });
        let client = connect(racy).await;
        let bolt = client.dispatcher().add_item("Bolt", 5).await.unwrap();

        client.dispatcher().update_item(&bolt.id, "Hex bolt", 7).await.unwrap();

        let stored = store.load_items(&owner()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Carriage bolt");
        assert_eq!(client.engine().item(&bolt.id), Some(stored[0].clone()));
    }

    #[tokio::test]
    async fn test_remote_delete_reconciles_selection() {
        let store = DocumentStore::in_memory();
        let phone = connect(Arc::new(store.clone())).await;
        let tablet = connect(Arc::new(store.clone())).await;

        let bolt = phone.dispatcher().add_item("Bolt", 5).await.unwrap();
        let nut = phone.dispatcher().add_item("Nut", 1).await.unwrap();
        assert!(eventually(|| tablet.engine().len() == 2).await);
        tablet.selection().toggle(&bolt.id);
        tablet.selection().toggle(&nut.id);

        phone.dispatcher().delete_item(&nut.id).await.unwrap();

        assert!(eventually(|| tablet.engine().len() == 1).await);
        assert_eq!(tablet.selection().selected(), BTreeSet::from([bolt.id]));
    }

    #[tokio::test]
    async fn test_no_delivery_after_disconnect() {
        let store = DocumentStore::in_memory();
        let phone = connect(Arc::new(store.clone())).await;
        let tablet = connect(Arc::new(store.clone())).await;
        assert!(tablet.is_listening());

        tablet.disconnect();
        tablet.disconnect();
        phone.dispatcher().add_item("Bolt", 5).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!tablet.is_listening());
        assert!(tablet.engine().is_empty());
    }

    #[tokio::test]
    async fn test_outage_keeps_last_known_state() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;
        client.dispatcher().add_item("Bolt", 5).await.unwrap();
        let mut events = client.engine().subscribe();

        store.set_reachable(false).await;

        let event = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Ok(ViewEvent::StreamError { collection, error }) => return (collection, error),
                    Ok(_) => continue,
                    Err(e) => panic!("event channel closed: {}", e),
                }
            }
        })
        .await
        .expect("stream error event");
        assert!(matches!(event.1, DomainError::StoreUnavailable { .. }));
        assert!(matches!(event.0, Collection::Items | Collection::Categories));
        assert_eq!(client.engine().len(), 1);

        let err = client.dispatcher().add_item("Nut", 1).await.unwrap_err();
        assert!(matches!(err, DomainError::StoreUnavailable { operation: "add_item", .. }));

        store.set_reachable(true).await;
        assert!(client.is_listening());
        assert_eq!(client.engine().len(), 1);
    }

    #[tokio::test]
    async fn test_assignment_reports_partial_failure() {
        let flaky = Arc::new(FlakyStore::new(DocumentStore::in_memory()));
        flaky
            .batch_write_items(&owner(), &[Item::new("a", "Bolt", 5), Item::new("b", "Nut", 1)])
            .await
            .unwrap();
        flaky.fail_updates_for(ItemId::from("b"));

        let client = connect(flaky.clone()).await;
        client.dispatcher().add_category("Tools").await.unwrap();
        assert!(eventually(|| client.engine().len() == 2).await);

        client.selection().toggle(&ItemId::from("a"));
        client.selection().toggle(&ItemId::from("b"));
        let report = client.dispatcher().assign_selected("Tools").await.unwrap();

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.failed[0].0, ItemId::from("b"));
        assert!(client.selection().is_empty());

        let tools = client.engine().project(&CategoryFilter::parse("Tools"), SortKey::NameAscending);
        assert_eq!(names(&tools), vec!["Bolt"]);
        assert_eq!(client.engine().item(&ItemId::from("b")).unwrap().category, "");
    }

    #[tokio::test]
    async fn test_assignment_validation() {
        let client = connect(Arc::new(DocumentStore::in_memory())).await;
        let bolt = client.dispatcher().add_item("Bolt", 5).await.unwrap();
        let ids = [bolt.id.clone()];

        let dispatcher = client.dispatcher();
        assert!(matches!(dispatcher.assign_category(&[], "Tools").await, Err(DomainError::Validation(_))));
        assert!(matches!(dispatcher.assign_category(&ids, "All").await, Err(DomainError::Validation(_))));
        assert!(matches!(dispatcher.assign_category(&ids, "Missing").await, Err(DomainError::Validation(_))));
        assert!(matches!(dispatcher.assign_selected("All").await, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_category_rejects_duplicates() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;
        client.dispatcher().add_category("Tools").await.unwrap();

        let dispatcher = client.dispatcher();
        assert!(matches!(dispatcher.add_category("tools").await, Err(DomainError::Conflict(_))));
        assert!(matches!(dispatcher.add_category("ALL").await, Err(DomainError::Conflict(_))));
        assert!(matches!(dispatcher.add_category("  ").await, Err(DomainError::Validation(_))));
        assert_eq!(store.load_categories(&owner()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_item_validation_never_reaches_store() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;
        let dispatcher = client.dispatcher();

        assert!(matches!(dispatcher.add_item("   ", 1).await, Err(DomainError::Validation(_))));
        assert!(matches!(dispatcher.add_item("Bolt", -1).await, Err(DomainError::Validation(_))));
        assert!(matches!(
            dispatcher.add_item("Bolt", i64::from(u32::MAX) + 1).await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(store.count(INVENTORY).await, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let client = connect(Arc::new(DocumentStore::in_memory())).await;
        let dispatcher = client.dispatcher();
        let bolt = dispatcher.add_item("Bolt", 5).await.unwrap();

        let updated = dispatcher.update_item(&bolt.id, "Hex bolt", 7).await.unwrap();
        assert_eq!(client.engine().item(&bolt.id), Some(updated));

        dispatcher.delete_item(&bolt.id).await.unwrap();
        assert!(client.engine().item(&bolt.id).is_none());

        let err = dispatcher.update_item(&bolt.id, "Ghost", 1).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signed_out_operations_fail() {
        let store: Arc<dyn StoreAdapter> = Arc::new(DocumentStore::in_memory());
        let nobody = Arc::new(SessionState::new());
        assert!(matches!(
            InventoryClient::connect(store.clone(), nobody).await,
            Err(DomainError::NotAuthenticated)
        ));

        let client = connect(store).await;
        client.dispatcher().add_item("Bolt", 5).await.unwrap();
        client.selection().toggle(&ItemId::from("anything"));
        client.sign_out();

        assert!(client.engine().is_empty());
        assert!(client.selection().is_empty());
        assert!(matches!(client.dispatcher().add_item("Nut", 1).await, Err(DomainError::NotAuthenticated)));
        assert!(matches!(client.migration().migrate(&[Item::new(1, "Bolt", 1)]).await, Err(DomainError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_writes_refused_during_migration() {
        let client = connect(Arc::new(DocumentStore::in_memory())).await;

        let guard = client.migration().gate().begin_migration().await.unwrap();
        let err = client.dispatcher().add_item("Bolt", 5).await.unwrap_err();
        assert_eq!(err, DomainError::MigrationInProgress);
        let err = client.migration().migrate(&[Item::new(1, "Bolt", 5)]).await.unwrap_err();
        assert_eq!(err, DomainError::MigrationInProgress);

        drop(guard);
        client.dispatcher().add_item("Bolt", 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_migration_writes_nothing() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;

        let err = client.migration().migrate(&[]).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(store.count(INVENTORY).await, 0);
    }

    #[tokio::test]
    async fn test_rerun_migration_does_not_duplicate() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;
        let local = vec![
            Item::new(1, "Bolt", 5).with_category("Hardware"),
            Item::new(2, "Nut", 0),
            Item::new(3, "Washer", 12),
        ];

        let first = client.migration().migrate(&local).await.unwrap();
        let second = client.migration().migrate(&local).await.unwrap();

        assert_eq!(first.count(), 3);
        assert_eq!(first.migrated, second.migrated);
        assert_eq!(store.count(INVENTORY).await, 3);
        assert!(eventually(|| client.engine().len() == 3).await);
        assert_eq!(client.engine().item(&ItemId::from("1")).unwrap().category, "Hardware");
    }

    #[tokio::test]
    async fn test_failed_migration_is_aborted_whole() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;
        store.set_reachable(false).await;

        let err = client.migration().migrate(&[Item::new(1, "Bolt", 5), Item::new(2, "Nut", 0)]).await.unwrap_err();

        assert!(matches!(err, DomainError::MigrationAborted { count: 2, cause: StoreError::Unavailable(_) }));
        assert!(!client.migration().gate().in_progress());
        store.set_reachable(true).await;
        assert_eq!(store.count(INVENTORY).await, 0);
    }

    #[tokio::test]
    async fn test_migrate_once_from_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let local = SqliteStore::open(&dir.path().join("InventoryApp.db")).unwrap();
        local.insert_item(&owner(), &ItemDraft::new("Bolt", 5).unwrap()).await.unwrap();
        local.insert_item(&owner(), &ItemDraft::new("Nut", 1).unwrap()).await.unwrap();

        let remote = DocumentStore::in_memory();
        let client = connect(Arc::new(remote.clone())).await;

        let report = client.migrate_once(&local, dir.path()).await.unwrap().expect("migrated");
        assert_eq!(report.count(), 2);
        assert!(load_config(dir.path()).unwrap().migration_completed);

        assert!(client.migrate_once(&local, dir.path()).await.unwrap().is_none());
        assert_eq!(remote.count(INVENTORY).await, 2);
    }

    #[tokio::test]
    async fn test_migrate_once_copies_unnamed_legacy_rows() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("InventoryApp.db")).unwrap();
        conn.execute(
            "INSERT INTO inventory (item_name, quantity, category_name) VALUES ('Bolt', 5, NULL), (NULL, 3, 'Hardware')",
            [],
        )
        .unwrap();
        let local = SqliteStore::new(conn);

        let remote = DocumentStore::in_memory();
        let client = connect(Arc::new(remote.clone())).await;

        let report = client.migrate_once(&local, dir.path()).await.unwrap().expect("migrated");
        assert_eq!(report.count(), 2);
        assert!(load_config(dir.path()).unwrap().migration_completed);

        let unnamed = remote.load_items(&owner()).await.unwrap().into_iter().find(|i| i.id == ItemId::from("2"));
        let unnamed = unnamed.expect("unnamed row migrated");
        assert_eq!(unnamed.name, "");
        assert_eq!(unnamed.quantity, 3);
        assert_eq!(unnamed.category, "Hardware");
    }

    #[tokio::test]
    async fn test_migrate_from_loads_owner_items() {
        let local = SqliteStore::open_in_memory().unwrap();
        local.insert_item(&owner(), &ItemDraft::new("Bolt", 5).unwrap()).await.unwrap();
        local.insert_item(&OwnerId::new("user-2"), &ItemDraft::new("Other", 1).unwrap()).await.unwrap();

        let remote = DocumentStore::in_memory();
        let client = connect(Arc::new(remote.clone())).await;

        let report = client.migration().migrate_from(&local).await.unwrap();
        assert_eq!(report.count(), 1);
        assert_eq!(report.owner, owner());
    }

    #[tokio::test]
    async fn test_profile_outcome() {
        let store = DocumentStore::in_memory();
        let client = connect(Arc::new(store.clone())).await;

        assert!(client.record_profile("user@example.com").await.unwrap().is_recorded());
        store.set_reachable(false).await;
        assert!(!client.record_profile("user@example.com").await.unwrap().is_recorded());
    }
}
