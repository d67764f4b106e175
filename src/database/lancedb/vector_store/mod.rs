
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::locks::KeyedLocks;
use super::{
    Collection, EmbeddingRecord, KeyPredicate, StoreClient, UPDATED_AT_COLUMN, VECTOR_COLUMN,
    map_store_error, validate_key, validate_vector,
};
use crate::{RecommenderError, Result};

/// Upper bound on rows read back for a single id
const DUPLICATE_SCAN_LIMIT: usize = 16;

/// Keyed embedding collections backed by LanceDB
pub struct EmbeddingStore {
    client: Arc<StoreClient>,
    dimension: usize,
    locks: KeyedLocks,
}

impl EmbeddingStore {
    /// Create a store over both collections, creating their tables if needed
    ///
    /// # Arguments
    /// * `client` - Shared connection handle
    /// * `dimension` - Vector length every record must have
    ///
    /// # Returns
    /// * `Result<Self>` - New store, or `DimensionMismatch` when an existing
    ///   table was created with a different dimension
    #[inline]
    pub async fn new(client: Arc<StoreClient>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RecommenderError::Config(
                "Embedding dimension must be positive".to_string(),
            ));
        }

        for collection in Collection::ALL {
            client.ensure_collection(collection, dimension).await?;
        }

        info!("Embedding store ready with {} dimensions", dimension);
        Ok(Self {
            client,
            dimension,
            locks: KeyedLocks::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn client(&self) -> &Arc<StoreClient> {
        &self.client
    }

    /// Insert or replace the record for `id`
    ///
    /// Existing rows for the id are removed before the insert. A failed
    /// existence check is logged and the insert goes ahead, so a stale row may
    /// survive until the next upsert for the same id.
    #[inline]
    pub async fn upsert(&self, collection: Collection, id: &str, vector: Vec<f32>) -> Result<()> {
        validate_key(id)?;
        validate_vector(&vector, self.dimension)?;

        let _guard = self.locks.lock(collection, id).await;
        let table = self.client.open_table(collection).await?;
        let predicate = KeyPredicate::Equals(id);

        let existing = self.count_matching(&table, collection, predicate).await;
        if plan_upsert(collection, id, existing) == UpsertPlan::ReplaceExisting {
            self.delete_matching(&table, collection, predicate).await?;
            debug!("Removed previous {} record for {}", collection, id);
        }

        let record = EmbeddingRecord::new(id, vector);
        self.append(&table, collection, std::slice::from_ref(&record))
            .await?;

        info!("Upserted {} {}", collection, id);
        Ok(())
    }

    /// Append records without existence checks
    ///
    /// Meant for bulk seeding where the ids are known to be new.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of records written
    #[inline]
    pub async fn batch_upsert(
        &self,
        collection: Collection,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if ids.len() != vectors.len() {
            return Err(RecommenderError::InvalidArgument(format!(
                "Batch has {} ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        if ids.is_empty() {
            debug!("No {} embeddings to store", collection);
            return Ok(0);
        }

        let records = ids
            .into_iter()
            .zip(vectors)
            .map(|(id, vector)| {
                validate_key(&id)?;
                validate_vector(&vector, self.dimension)?;
                Ok(EmbeddingRecord::new(id, vector))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Storing batch of {} {} embeddings", records.len(), collection);

        let table = self.client.open_table(collection).await?;
        self.append(&table, collection, &records).await?;

        info!("Stored {} {} embeddings", records.len(), collection);
        Ok(records.len())
    }

    /// Replace the record for `id`, failing with `NotFound` if none exists
    #[inline]
    pub async fn update(&self, collection: Collection, id: &str, vector: Vec<f32>) -> Result<()> {
        validate_key(id)?;
        validate_vector(&vector, self.dimension)?;

        let _guard = self.locks.lock(collection, id).await;
        let table = self.client.open_table(collection).await?;
        let predicate = KeyPredicate::Equals(id);

        if self.count_matching(&table, collection, predicate).await? == 0 {
            return Err(RecommenderError::not_found(collection, id));
        }

        self.delete_matching(&table, collection, predicate).await?;
        let record = EmbeddingRecord::new(id, vector);
        self.append(&table, collection, std::slice::from_ref(&record))
            .await?;

        info!("Updated {} {}", collection, id);
        Ok(())
    }

    /// Exact-key lookup
    ///
    /// If a concurrent writer left duplicates behind, the newest row wins.
    #[inline]
    pub async fn get(&self, collection: Collection, id: &str) -> Result<EmbeddingRecord> {
        validate_key(id)?;

        let table = self.client.open_table(collection).await?;
        let records = self
            .query_records(
                &table,
                collection,
                KeyPredicate::Equals(id),
                DUPLICATE_SCAN_LIMIT,
            )
            .await?;

        if records.len() > 1 {
            warn!(
                "{} {} has {} live rows, returning the newest",
                collection,
                id,
                records.len()
            );
        }

        records
            .into_iter()
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
            .ok_or_else(|| RecommenderError::not_found(collection, id))
    }

    /// Remove every row for `id`
    ///
    /// # Returns
    /// * `Result<bool>` - Whether anything was deleted
    #[inline]
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        validate_key(id)?;

        let _guard = self.locks.lock(collection, id).await;
        let table = self.client.open_table(collection).await?;
        let predicate = KeyPredicate::Equals(id);

        if self.count_matching(&table, collection, predicate).await? == 0 {
            debug!("No {} record to delete for {}", collection, id);
            return Ok(false);
        }

        self.delete_matching(&table, collection, predicate).await?;
        info!("Deleted {} {}", collection, id);
        Ok(true)
    }

    /// Remove every record in the collection
    ///
    /// # Returns
    /// * `Result<u64>` - Number of rows removed
    #[inline]
    pub async fn delete_all(&self, collection: Collection) -> Result<u64> {
        let table = self.client.open_table(collection).await?;
        let existing = self
            .count_matching(&table, collection, KeyPredicate::All)
            .await?;

        self.delete_matching(&table, collection, KeyPredicate::All)
            .await?;

        info!("Deleted all {} {} records", existing, collection);
        Ok(existing as u64)
    }

    /// Number of rows in the collection, duplicates included
    #[inline]
    pub async fn count(&self, collection: Collection) -> Result<u64> {
        let table = self.client.open_table(collection).await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| map_store_error("Failed to count rows", e))?;
        Ok(count as u64)
    }

    /// Distinct ids in ascending order
    #[inline]
    pub async fn list_ids(&self, collection: Collection) -> Result<Vec<String>> {
        let table = self.client.open_table(collection).await?;
        let total = self.count_matching(&table, collection, KeyPredicate::All).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .query()
            .select(Select::columns(&[collection.key_field()]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| map_store_error("Failed to list ids", e))?;

        let mut ids = Vec::with_capacity(total);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| map_store_error("Failed to read result stream", e))?
        {
            let keys = string_column(&batch, collection.key_field())?;
            ids.extend((0..batch.num_rows()).map(|row| keys.value(row).to_string()));
        }

        Ok(ids.into_iter().sorted().dedup().collect())
    }

    /// Read every record in the collection
    #[inline]
    pub async fn scan(&self, collection: Collection) -> Result<Vec<EmbeddingRecord>> {
        let table = self.client.open_table(collection).await?;
        let total = self.count_matching(&table, collection, KeyPredicate::All).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let records = self
            .query_records(&table, collection, KeyPredicate::All, total)
            .await?;
        debug!("Scanned {} {} records", records.len(), collection);
        Ok(records)
    }

    /// Compact data files and prune old table versions
    #[inline]
    pub async fn optimize(&self, collection: Collection) -> Result<()> {
        debug!("Optimizing {} table", collection.table_name());

        let table = self.client.open_table(collection).await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| map_store_error("Failed to optimize table", e))?;

        info!("{} table optimization completed", collection.table_name());
        Ok(())
    }

    async fn count_matching(
        &self,
        table: &Table,
        collection: Collection,
        predicate: KeyPredicate<'_>,
    ) -> Result<usize> {
        table
            .count_rows(Some(predicate.to_filter(collection)))
            .await
            .map_err(|e| map_store_error("Failed to count rows", e))
    }

    async fn delete_matching(
        &self,
        table: &Table,
        collection: Collection,
        predicate: KeyPredicate<'_>,
    ) -> Result<()> {
        table
            .delete(&predicate.to_filter(collection))
            .await
            .map_err(|e| {
                map_store_error(format_args!("Failed to delete {} records", collection), e)
            })?;
        Ok(())
    }

    async fn append(
        &self,
        table: &Table,
        collection: Collection,
        records: &[EmbeddingRecord],
    ) -> Result<()> {
        let record_batch = self.create_record_batch(collection, records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        table.add(reader).execute().await.map_err(|e| {
            map_store_error(format_args!("Failed to insert {} embeddings", collection), e)
        })?;
        Ok(())
    }

    async fn query_records(
        &self,
        table: &Table,
        collection: Collection,
        predicate: KeyPredicate<'_>,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>> {
        let mut stream = table
            .query()
            .only_if(predicate.to_filter(collection))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| map_store_error("Failed to query records", e))?;

        let mut records = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| map_store_error("Failed to read result stream", e))?
        {
            records.extend(parse_record_batch(collection, &batch)?);
        }
        Ok(records)
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(
        &self,
        collection: Collection,
        records: &[EmbeddingRecord],
    ) -> Result<RecordBatch> {
        let mut flat_values = Vec::with_capacity(records.len() * self.dimension);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RecommenderError::Database(format!("Failed to create vector array: {}", e)))?;

        let ids = StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()));
        let updated_ats =
            StringArray::from_iter_values(records.iter().map(|r| r.updated_at.as_str()));

        RecordBatch::try_new(
            StoreClient::schema(collection, self.dimension),
            vec![Arc::new(ids), Arc::new(vector_array), Arc::new(updated_ats)],
        )
        .map_err(|e| RecommenderError::Database(format!("Failed to create record batch: {}", e)))
    }
}

/// What an upsert does before inserting its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpsertPlan {
    InsertOnly,
    ReplaceExisting,
}

/// Decide from the existence check whether old rows must be deleted first
///
/// A failed check is logged and treated as "nothing to delete", so the
/// insert still happens and a stale row may survive until the next upsert.
fn plan_upsert(collection: Collection, id: &str, existing: Result<usize>) -> UpsertPlan {
    match existing {
        Ok(0) => {
            debug!("No existing {} record for {}", collection, id);
            UpsertPlan::InsertOnly
        }
        Ok(count) => {
            if count > 1 {
                warn!(
                    "Found {} rows for {} {}, removing all before insert",
                    count, collection, id
                );
            }
            UpsertPlan::ReplaceExisting
        }
        Err(e) => {
            warn!(
                "Existence check for {} {} failed, inserting anyway: {}",
                collection, id, e
            );
            UpsertPlan::InsertOnly
        }
    }
}

pub(super) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RecommenderError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RecommenderError::Database(format!("Invalid {} column type", name)))
}

/// Parse a record batch with key, vector and timestamp columns
fn parse_record_batch(collection: Collection, batch: &RecordBatch) -> Result<Vec<EmbeddingRecord>> {
    let ids = string_column(batch, collection.key_field())?;
    let updated_ats = string_column(batch, UPDATED_AT_COLUMN)?;
    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .ok_or_else(|| RecommenderError::Database(format!("Missing {} column", VECTOR_COLUMN)))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| {
            RecommenderError::Database(format!("Invalid {} column type", VECTOR_COLUMN))
        })?;

    (0..batch.num_rows())
        .map(|row| {
            let values = vectors.value(row);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| {
                    RecommenderError::Database("Vector values are not float32".to_string())
                })?;

            Ok(EmbeddingRecord {
                id: ids.value(row).to_string(),
                vector: values.values().to_vec(),
                updated_at: updated_ats.value(row).to_string(),
            })
        })
        .collect()
}
