use std::sync::Arc;

use bson::doc;
use bson::oid::ObjectId;

use crate::db::filter::RecordFilter;
use crate::db::models::{NewRecord, Record, RecordPatch};
use crate::db::repository::RecordStore;
use crate::error::AppError;
use crate::models::schema::RecordSchema;

/// Result of a successful delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record had no editors and no longer exists.
    Removed,
    /// The record survives under its first editor, who left the editor list.
    Transferred { new_owner: String },
}

/// Access-controlled operations over one record collection.
///
/// One instance exists per configured record kind; they differ only in the
/// collection behind `store` and the `schema` applied to request bodies.
pub struct RecordService {
    name: String,
    tag: String,
    schema: RecordSchema,
    store: Arc<dyn RecordStore>,
}

/// Ids are opaque to callers; anything that is not a valid ObjectId
/// cannot name an existing record.
fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

impl RecordService {
    pub fn new(name: &str, tag: &str, schema: RecordSchema, store: Arc<dyn RecordStore>) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            schema,
            store,
        }
    }

    /// Collection name, also used as the HTTP path prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label of the record kind.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn not_found(&self, id: &str) -> AppError {
        AppError::NotFound(format!("Record '{}' not found in '{}'", id, self.name))
    }

    async fn load(&self, id: &str) -> Result<(ObjectId, Record), AppError> {
        let oid = parse_id(id).ok_or_else(|| self.not_found(id))?;
        let record = self
            .store
            .find_by_id(&oid)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        Ok((oid, record))
    }

    /// A conditional write matched nothing: either the record vanished or
    /// someone else wrote first.
    async fn lost_race(&self, oid: &ObjectId, id: &str) -> AppError {
        match self.store.find_by_id(oid).await {
            Ok(None) => self.not_found(id),
            Ok(Some(_)) => {
                tracing::warn!(collection = %self.name, id, "concurrent modification detected");
                AppError::Conflict(format!(
                    "Record '{}' was modified concurrently, retry the request",
                    id
                ))
            }
            Err(e) => e,
        }
    }

    pub async fn create(&self, payload: NewRecord, owner: &str) -> Result<Record, AppError> {
        let record = self.store.insert(payload.into_record(owner)).await?;
        tracing::info!(
            collection = %self.name,
            id = %record.id_hex(),
            owner,
            "record created"
        );
        Ok(record)
    }

    /// Public listing: visible records, plus every record the caller
    /// holds a role on.
    pub async fn list(
        &self,
        caller: Option<&str>,
        title_filter: Option<&str>,
    ) -> Result<Vec<Record>, AppError> {
        let filter = RecordFilter::visible_to(caller).title_contains(title_filter);
        self.store.find(&filter).await
    }

    /// Records the caller owns, edits or views, visible or not.
    pub async fn list_mine(
        &self,
        caller: &str,
        title_filter: Option<&str>,
    ) -> Result<Vec<Record>, AppError> {
        let filter = RecordFilter::member(caller).title_contains(title_filter);
        self.store.find(&filter).await
    }

    /// Raw lookup by id. Performs no visibility check.
    pub async fn get(&self, id: &str) -> Result<Record, AppError> {
        let (_, record) = self.load(id).await?;
        Ok(record)
    }

    pub async fn update(
        &self,
        id: &str,
        patch: RecordPatch,
        caller: &str,
    ) -> Result<Record, AppError> {
        let (oid, current) = self.load(id).await?;

        if !current.is_editable_by(caller) {
            tracing::warn!(collection = %self.name, id, caller, "update denied");
            return Err(AppError::Forbidden(format!(
                "User '{}' cannot edit record '{}'",
                caller, id
            )));
        }

        if patch.is_empty() {
            return Ok(current);
        }

        match self
            .store
            .update_if_revision(&oid, current.revision, patch.into_changes())
            .await?
        {
            Some(updated) => {
                tracing::info!(collection = %self.name, id, caller, "record updated");
                Ok(updated)
            }
            None => Err(self.lost_race(&oid, id).await),
        }
    }

    /// Delete by the owner. A record with editors is not removed: ownership
    /// passes to the first editor, who is popped from the editor list.
    pub async fn delete(&self, id: &str, caller: &str) -> Result<DeleteOutcome, AppError> {
        let (oid, current) = self.load(id).await?;

        if !current.is_owned_by(caller) {
            tracing::warn!(collection = %self.name, id, caller, "delete denied");
            return Err(AppError::Forbidden(format!(
                "User '{}' does not own record '{}'",
                caller, id
            )));
        }

        let mut editors = current.editors.into_iter();
        let Some(new_owner) = editors.next() else {
            if self.store.delete_if_revision(&oid, current.revision).await? {
                tracing::info!(collection = %self.name, id, caller, "record removed");
                return Ok(DeleteOutcome::Removed);
            }
            return Err(self.lost_race(&oid, id).await);
        };

        let remaining: Vec<String> = editors.collect();
        let changes = doc! { "owner": new_owner.as_str(), "editors": remaining };

        match self
            .store
            .update_if_revision(&oid, current.revision, changes)
            .await?
        {
            Some(_) => {
                tracing::info!(
                    collection = %self.name,
                    id,
                    from = caller,
                    to = %new_owner,
                    "ownership transferred"
                );
                Ok(DeleteOutcome::Transferred { new_owner })
            }
            None => Err(self.lost_race(&oid, id).await),
        }
    }

    pub async fn is_editable(&self, id: &str, username: &str) -> Result<bool, AppError> {
        Ok(self
            .find_optional(id)
            .await?
            .is_some_and(|r| r.is_editable_by(username)))
    }

    pub async fn is_owned(&self, id: &str, username: &str) -> Result<bool, AppError> {
        Ok(self
            .find_optional(id)
            .await?
            .is_some_and(|r| r.is_owned_by(username)))
    }

    /// True when no record carries exactly this title. Insert does not
    /// enforce it; callers use it as a pre-create guard.
    pub async fn title_is_unique(&self, title: &str) -> Result<bool, AppError> {
        Ok(!self.store.exists(&RecordFilter::title_exact(title)).await?)
    }

    pub async fn count(&self) -> Result<u64, AppError> {
        self.store.count().await
    }

    async fn find_optional(&self, id: &str) -> Result<Option<Record>, AppError> {
        match parse_id(id) {
            Some(oid) => self.store.find_by_id(&oid).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryRecordStore;
    use async_trait::async_trait;
    use bson::Document;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service() -> RecordService {
        RecordService::new(
            "notes",
            "Notes",
            RecordSchema::default(),
            Arc::new(InMemoryRecordStore::new("notes")),
        )
    }

    fn payload(title: &str) -> NewRecord {
        NewRecord {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn shared(title: &str, editors: &[&str], viewers: &[&str], visible: Option<bool>) -> NewRecord {
        NewRecord {
            title: title.to_string(),
            editors: editors.iter().map(|s| s.to_string()).collect(),
            viewers: viewers.iter().map(|s| s.to_string()).collect(),
            visible,
            fields: Document::new(),
        }
    }

    fn titles(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_sets_owner_and_default_visibility() {
        let svc = service();
        let record = svc.create(payload("Plan"), "alice").await.unwrap();
        assert!(record.id.is_some());
        assert_eq!(record.owner, "alice");
        assert_eq!(record.visible, Some(true));

        let hidden = svc
            .create(shared("Secret", &[], &[], Some(false)), "alice")
            .await
            .unwrap();
        assert_eq!(hidden.visible, Some(false));
    }

    #[tokio::test]
    async fn test_list_visibility() {
        let svc = service();
        svc.create(shared("public", &[], &[], Some(true)), "alice").await.unwrap();
        svc.create(shared("hidden", &["bob"], &["carol"], Some(false)), "alice")
            .await
            .unwrap();

        assert_eq!(titles(&svc.list(None, None).await.unwrap()), vec!["public"]);
        for member in ["alice", "bob", "carol"] {
            assert_eq!(
                titles(&svc.list(Some(member), None).await.unwrap()),
                vec!["public", "hidden"],
                "member {member}"
            );
        }
        assert_eq!(titles(&svc.list(Some("eve"), None).await.unwrap()), vec!["public"]);
    }

    #[tokio::test]
    async fn test_list_mine_ignores_public_records() {
        let svc = service();
        svc.create(shared("theirs", &[], &[], Some(true)), "alice").await.unwrap();
        svc.create(shared("viewing", &[], &["bob"], Some(false)), "alice")
            .await
            .unwrap();
        svc.create(payload("mine"), "bob").await.unwrap();

        assert_eq!(
            titles(&svc.list_mine("bob", None).await.unwrap()),
            vec!["viewing", "mine"]
        );
        assert!(svc.list_mine("eve", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_title_filter_is_conjoined() {
        let svc = service();
        svc.create(payload("test_record"), "alice").await.unwrap();
        svc.create(payload("test_record_2"), "alice").await.unwrap();
        svc.create(shared("hidden_2", &[], &[], Some(false)), "alice").await.unwrap();

        assert_eq!(
            titles(&svc.list(None, Some("2")).await.unwrap()),
            vec!["test_record_2"]
        );
        assert_eq!(
            titles(&svc.list_mine("alice", Some("2")).await.unwrap()),
            vec!["test_record_2", "hidden_2"]
        );
    }

    #[tokio::test]
    async fn test_get_has_no_visibility_check() {
        let svc = service();
        let hidden = svc
            .create(shared("hidden", &[], &[], Some(false)), "alice")
            .await
            .unwrap();
        let fetched = svc.get(&hidden.id_hex()).await.unwrap();
        assert_eq!(fetched, hidden);
    }

    #[tokio::test]
    async fn test_get_unknown_or_malformed_id() {
        let svc = service();
        for id in [ObjectId::new().to_hex(), "not-an-id".to_string()] {
            match svc.get(&id).await {
                Err(AppError::NotFound(_)) => {}
                other => panic!("Expected NotFound, got: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_update_merges_patch() {
        let svc = service();
        let mut new = payload("Plan");
        new.fields = doc! { "summary": "draft", "rating": 2_i64 };
        let record = svc.create(new, "alice").await.unwrap();

        let patch = RecordPatch {
            visible: Some(false),
            fields: doc! { "summary": "final" },
            ..Default::default()
        };
        let updated = svc.update(&record.id_hex(), patch, "alice").await.unwrap();

        assert_eq!(updated.title, "Plan");
        assert_eq!(updated.visible, Some(false));
        assert_eq!(updated.fields.get_str("summary").unwrap(), "final");
        assert_eq!(updated.fields.get_i64("rating").unwrap(), 2);
        assert_eq!(updated.revision, record.revision + 1);
    }

    #[tokio::test]
    async fn test_empty_patch_leaves_record_unchanged() {
        let svc = service();
        let record = svc.create(payload("Plan"), "alice").await.unwrap();
        let same = svc
            .update(&record.id_hex(), RecordPatch::default(), "alice")
            .await
            .unwrap();
        assert_eq!(same, record);
    }

    #[tokio::test]
    async fn test_update_authorization() {
        let svc = service();
        let record = svc
            .create(shared("Plan", &["bob"], &["carol"], None), "alice")
            .await
            .unwrap();
        let id = record.id_hex();
        let patch = || RecordPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };

        assert!(svc.update(&id, patch(), "bob").await.is_ok());
        for stranger in ["carol", "eve"] {
            match svc.update(&id, patch(), stranger).await {
                Err(AppError::Forbidden(_)) => {}
                other => panic!("Expected Forbidden, got: {:?}", other),
            }
        }
        match svc.update(&ObjectId::new().to_hex(), patch(), "alice").await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_without_editors_removes() {
        let svc = service();
        let record = svc.create(payload("Plan"), "alice").await.unwrap();
        let id = record.id_hex();

        assert_eq!(svc.delete(&id, "alice").await.unwrap(), DeleteOutcome::Removed);
        assert!(matches!(svc.get(&id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(&id, "alice").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_transfers_ownership_down_the_editor_list() {
        let svc = service();
        let record = svc
            .create(shared("Plan", &["e1", "e2"], &["v"], None), "owner")
            .await
            .unwrap();
        let id = record.id_hex();

        assert_eq!(
            svc.delete(&id, "owner").await.unwrap(),
            DeleteOutcome::Transferred { new_owner: "e1".to_string() }
        );
        let after_first = svc.get(&id).await.unwrap();
        assert_eq!(after_first.owner, "e1");
        assert_eq!(after_first.editors, vec!["e2"]);
        assert_eq!(after_first.viewers, vec!["v"]);
        assert_eq!(after_first.title, "Plan");

        assert_eq!(
            svc.delete(&id, "e1").await.unwrap(),
            DeleteOutcome::Transferred { new_owner: "e2".to_string() }
        );
        let after_second = svc.get(&id).await.unwrap();
        assert_eq!(after_second.owner, "e2");
        assert!(after_second.editors.is_empty());

        assert_eq!(svc.delete(&id, "e2").await.unwrap(), DeleteOutcome::Removed);
        assert!(matches!(svc.get(&id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_by_non_owner_is_forbidden_and_mutates_nothing() {
        let svc = service();
        let record = svc
            .create(shared("Plan", &["e1", "e2"], &["v"], None), "owner")
            .await
            .unwrap();
        let id = record.id_hex();

        for caller in ["e1", "e2", "v", "eve"] {
            match svc.delete(&id, caller).await {
                Err(AppError::Forbidden(_)) => {}
                other => panic!("Expected Forbidden for {caller}, got: {:?}", other),
            }
        }
        assert_eq!(svc.get(&id).await.unwrap(), record);

        // The previous owner loses delete rights after a transfer.
        svc.delete(&id, "owner").await.unwrap();
        assert!(matches!(svc.delete(&id, "owner").await, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_is_editable_and_is_owned() {
        let svc = service();
        let record = svc
            .create(shared("Plan", &["e1", "e2"], &["v"], None), "owner")
            .await
            .unwrap();
        let id = record.id_hex();

        for user in ["owner", "e1", "e2"] {
            assert!(svc.is_editable(&id, user).await.unwrap(), "{user}");
        }
        assert!(!svc.is_editable(&id, "v").await.unwrap());
        assert!(!svc.is_editable(&id, "eve").await.unwrap());

        assert!(svc.is_owned(&id, "owner").await.unwrap());
        assert!(!svc.is_owned(&id, "e1").await.unwrap());

        let missing = ObjectId::new().to_hex();
        assert!(!svc.is_editable(&missing, "owner").await.unwrap());
        assert!(!svc.is_owned("garbage", "owner").await.unwrap());
    }

    #[tokio::test]
    async fn test_title_is_unique_is_exact() {
        let svc = service();
        svc.create(payload("test_record"), "alice").await.unwrap();

        assert!(!svc.title_is_unique("test_record").await.unwrap());
        assert!(svc.title_is_unique("test_rec").await.unwrap());
        assert!(svc.title_is_unique("test_record_2").await.unwrap());
    }

    #[tokio::test]
    async fn test_end_to_end_visibility_toggle() {
        let svc = service();
        let record = svc.create(payload("Plan"), "alice").await.unwrap();
        let id = record.id_hex();
        assert_eq!(titles(&svc.list(None, None).await.unwrap()), vec!["Plan"]);

        let patch = RecordPatch {
            visible: Some(false),
            ..Default::default()
        };
        svc.update(&id, patch, "alice").await.unwrap();

        assert!(svc.list(None, None).await.unwrap().is_empty());
        assert_eq!(titles(&svc.list_mine("alice", None).await.unwrap()), vec!["Plan"]);
    }

    /// Store that lets another writer land between the read and the
    /// conditional write of the next update or delete.
    struct RacingStore {
        inner: InMemoryRecordStore,
        armed: AtomicBool,
    }

    #[async_trait]
    impl RecordStore for RacingStore {
        async fn insert(&self, record: Record) -> Result<Record, AppError> {
            self.inner.insert(record).await
        }

        async fn find(&self, filter: &RecordFilter) -> Result<Vec<Record>, AppError> {
            self.inner.find(filter).await
        }

        async fn exists(&self, filter: &RecordFilter) -> Result<bool, AppError> {
            self.inner.exists(filter).await
        }

        async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Record>, AppError> {
            self.inner.find_by_id(id).await
        }

        async fn update_if_revision(
            &self,
            id: &ObjectId,
            expected_revision: i64,
            changes: Document,
        ) -> Result<Option<Record>, AppError> {
            self.interfere(id).await?;
            self.inner.update_if_revision(id, expected_revision, changes).await
        }

        async fn delete_if_revision(
            &self,
            id: &ObjectId,
            expected_revision: i64,
        ) -> Result<bool, AppError> {
            self.interfere(id).await?;
            self.inner.delete_if_revision(id, expected_revision).await
        }

        async fn count(&self) -> Result<u64, AppError> {
            self.inner.count().await
        }
    }

    impl RacingStore {
        async fn interfere(&self, id: &ObjectId) -> Result<(), AppError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                let current = self.inner.find_by_id(id).await?.unwrap();
                self.inner
                    .update_if_revision(id, current.revision, doc! { "title": "concurrent" })
                    .await?;
            }
            Ok(())
        }
    }

    fn racing_service() -> (Arc<RacingStore>, RecordService) {
        let store = Arc::new(RacingStore {
            inner: InMemoryRecordStore::new("notes"),
            armed: AtomicBool::new(false),
        });
        let svc = RecordService::new("notes", "Notes", RecordSchema::default(), store.clone());
        (store, svc)
    }

    #[tokio::test]
    async fn test_concurrent_update_is_detected() {
        let (store, svc) = racing_service();
        let record = svc.create(payload("Plan"), "alice").await.unwrap();
        let id = record.id_hex();

        store.armed.store(true, Ordering::SeqCst);
        let patch = RecordPatch {
            visible: Some(false),
            ..Default::default()
        };
        match svc.update(&id, patch, "alice").await {
            Err(AppError::Conflict(_)) => {}
            other => panic!("Expected Conflict, got: {:?}", other),
        }

        // The concurrent write survives and the losing patch was not applied.
        let stored = svc.get(&id).await.unwrap();
        assert_eq!(stored.title, "concurrent");
        assert_eq!(stored.visible, Some(true));
    }

    #[tokio::test]
    async fn test_concurrent_delete_is_detected() {
        let (store, svc) = racing_service();
        let record = svc
            .create(shared("Plan", &["e1"], &[], None), "owner")
            .await
            .unwrap();
        let id = record.id_hex();

        store.armed.store(true, Ordering::SeqCst);
        assert!(matches!(svc.delete(&id, "owner").await, Err(AppError::Conflict(_))));
        let stored = svc.get(&id).await.unwrap();
        assert_eq!(stored.owner, "owner");
        assert_eq!(stored.editors, vec!["e1"]);

        // A retry against the fresh revision goes through.
        assert!(svc.delete(&id, "owner").await.is_ok());
    }
}
