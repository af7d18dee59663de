use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};

use crate::db::filter::RecordFilter;
use crate::db::models::Record;
use crate::error::AppError;

/// Repository trait for one record collection.
///
/// Every single call is atomic on its own. The conditional writes take the
/// revision the caller last read and fail (returning `None` / `false`)
/// when the stored document has moved on or disappeared.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return it with its assigned id.
    async fn insert(&self, record: Record) -> Result<Record, AppError>;

    /// All records matching the filter, in ascending id order.
    async fn find(&self, filter: &RecordFilter) -> Result<Vec<Record>, AppError>;

    /// Whether at least one record matches the filter.
    async fn exists(&self, filter: &RecordFilter) -> Result<bool, AppError>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Record>, AppError>;

    /// `$set` the given top-level fields and bump the revision, provided
    /// the stored revision still equals `expected_revision`.
    async fn update_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
        changes: Document,
    ) -> Result<Option<Record>, AppError>;

    /// Remove the record, provided its revision still equals `expected_revision`.
    async fn delete_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
    ) -> Result<bool, AppError>;

    async fn count(&self) -> Result<u64, AppError>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Match a document by id and revision. Revision 0 also matches legacy
/// documents that never had the field.
pub fn revision_filter(id: &ObjectId, expected_revision: i64) -> Document {
    if expected_revision == 0 {
        doc! {
            "_id": *id,
            "$or": [ { "revision": 0_i64 }, { "revision": { "$exists": false } } ]
        }
    } else {
        doc! { "_id": *id, "revision": expected_revision }
    }
}

/// MongoDB implementation of the RecordStore.
pub struct MongoRecordStore {
    database: mongodb::Database,
    collection: mongodb::Collection<Record>,
}

impl MongoRecordStore {
    pub fn new(db: &mongodb::Database, collection: &str) -> Self {
        Self {
            database: db.clone(),
            collection: db.collection(collection),
        }
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn insert(&self, mut record: Record) -> Result<Record, AppError> {
        let result = self.collection.insert_one(&record).await?;

        match result.inserted_id {
            Bson::ObjectId(id) => {
                record.id = Some(id);
                Ok(record)
            }
            other => Err(AppError::Database(format!(
                "Unexpected inserted id type in '{}': {}",
                self.collection.name(),
                other
            ))),
        }
    }

    async fn find(&self, filter: &RecordFilter) -> Result<Vec<Record>, AppError> {
        use futures::TryStreamExt;
        use mongodb::options::FindOptions;

        let query = filter.to_document();
        tracing::debug!(collection = self.collection.name(), %query, "find");

        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();

        let cursor = self.collection.find(query).with_options(options).await?;
        let records: Vec<Record> = cursor.try_collect().await?;

        Ok(records)
    }

    async fn exists(&self, filter: &RecordFilter) -> Result<bool, AppError> {
        let found = self.collection.find_one(filter.to_document()).await?;
        Ok(found.is_some())
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Record>, AppError> {
        Ok(self.collection.find_one(doc! { "_id": *id }).await?)
    }

    async fn update_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
        changes: Document,
    ) -> Result<Option<Record>, AppError> {
        use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(
                revision_filter(id, expected_revision),
                doc! { "$set": changes, "$inc": { "revision": 1_i64 } },
            )
            .with_options(options)
            .await?;

        Ok(updated)
    }

    async fn delete_if_revision(
        &self,
        id: &ObjectId,
        expected_revision: i64,
    ) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(revision_filter(id, expected_revision))
            .await?;

        Ok(result.deleted_count == 1)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
