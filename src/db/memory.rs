use std::sync::Mutex;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::Document;

use crate::db::filter::RecordFilter;
use crate::db::models::Record;
use crate::db::repository::RecordStore;
use crate::error::AppError;

/// Process-local record collection used when no MongoDB is configured.
///
/// Records are kept in insertion order, which matches the id order of a
/// MongoDB collection because ids are generated monotonically.
pub struct InMemoryRecordStore {
    name: String,
    records: Mutex<Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Record>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal(format!("Record store '{}' is poisoned", self.name)))
    }
}

/// Shallow `$set` of `changes` onto the stored record.
fn apply_changes(record: &Record, changes: Document) -> Result<Record, AppError> {
    let mut stored = bson::to_document(record)
        .map_err(|e| AppError::Internal(format!("Failed to encode record: {e}")))?;
    for (key, value) in changes {
        stored.insert(key, value);
    }
    let mut merged: Record = bson::from_document(stored)
        .map_err(|e| AppError::Validation(format!("Update produces an invalid record: {e}")))?;
    merged.revision = record.revision + 1;
    Ok(merged)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, mut record: Record) -> Result<Record, AppError> {
        record.id = Some(ObjectId::new());
        self.lock()?.push(record.clone());
        Ok(record)
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<Record>, AppError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn exists(&self, filter: &RecordFilter) -> Result<bool, AppError> {
        Ok(self.lock()?.iter().any(|r| filter.matches(r)))
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Record>, AppError> {
        Ok(self
            .lock()?
            .iter()
            .find(|r| r.id.as_ref() == Some(id))
            .cloned())
    }

    async fn update_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
        changes: Document,
    ) -> Result<Option<Record>, AppError> {
        let mut records = self.lock()?;
        let Some(slot) = records
            .iter_mut()
            .find(|r| r.id.as_ref() == Some(id) && r.revision == expected_revision)
        else {
            return Ok(None);
        };

        let merged = apply_changes(slot, changes)?;
        *slot = merged.clone();
        Ok(Some(merged))
    }

    async fn delete_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
    ) -> Result<bool, AppError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| !(r.id.as_ref() == Some(id) && r.revision == expected_revision));
        Ok(records.len() < before)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.lock()?.len() as u64)
    }
}
