#[cfg(test)]
mod tests;

use arrow::array::{Array, Float32Array};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::DistanceType;
use lancedb::index::Index;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::vector_store::string_column;
use super::{
    Collection, KeyPredicate, StoreClient, VECTOR_COLUMN, map_store_error, validate_dimension,
};
use crate::config::StoreConfig;
use crate::{RecommenderError, Result};

/// Rows fetched beyond `top_k` to absorb the excluded id and stray duplicates
pub const SEARCH_MARGIN: usize = 8;

/// Recall and latency knobs for vector search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// IVF partitions probed per query; ignored until an index exists
    pub nprobes: usize,
    /// Re-rank this many times `limit` candidates with exact distances
    pub refine_factor: Option<u32>,
    pub timeout: Duration,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl SearchParams {
    #[inline]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            nprobes: config.nprobes,
            refine_factor: config.refine_factor,
            timeout: Duration::from_secs(config.query_timeout_secs),
        }
    }
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    /// Cosine distance as reported by LanceDB
    pub distance: f32,
}

/// Cosine nearest-neighbor search over an embedding collection
pub struct SimilarityIndex {
    client: Arc<StoreClient>,
    dimension: usize,
    params: SearchParams,
}

impl SimilarityIndex {
    #[inline]
    pub fn new(client: Arc<StoreClient>, dimension: usize, params: SearchParams) -> Self {
        Self {
            client,
            dimension,
            params,
        }
    }

    #[inline]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Rank records by cosine similarity to `query`
    ///
    /// # Arguments
    /// * `collection` - Collection to search
    /// * `query` - Query vector, same dimension as the collection
    /// * `exclude_id` - Id that must never appear in the results
    /// * `top_k` - Maximum number of results
    ///
    /// # Returns
    /// * `Result<Vec<SearchHit>>` - Hits by descending score, ties by ascending id
    #[inline]
    pub async fn search(
        &self,
        collection: Collection,
        query: &[f32],
        exclude_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        validate_dimension(query, self.dimension)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        tokio::time::timeout(
            self.params.timeout,
            self.execute_search(collection, query, exclude_id, top_k),
        )
        .await
        .map_err(|_| {
            RecommenderError::StoreUnavailable(format!(
                "Search in {} timed out after {:?}",
                collection.table_name(),
                self.params.timeout
            ))
        })?
    }

    async fn execute_search(
        &self,
        collection: Collection,
        query: &[f32],
        exclude_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        debug!(
            "Searching {} with limit {} (nprobes {}, excluding {:?})",
            collection.table_name(),
            top_k,
            self.params.nprobes,
            exclude_id
        );

        let table = self.client.open_table(collection).await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| map_store_error("Failed to count rows", e))?;
        if rows == 0 {
            debug!("{} is empty, nothing to search", collection.table_name());
            return Ok(Vec::new());
        }

        let limit = search_limit(top_k, rows);
        let mut vector_query = table
            .vector_search(query)
            .map_err(|e| map_store_error("Failed to create vector search", e))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .nprobes(self.params.nprobes)
            .select(Select::columns(&[collection.key_field()]))
            .limit(limit);

        if let Some(refine_factor) = self.params.refine_factor {
            vector_query = vector_query.refine_factor(refine_factor);
        }

        if let Some(id) = exclude_id {
            vector_query = vector_query.only_if(KeyPredicate::NotEquals(id).to_filter(collection));
        }

        let mut results = vector_query
            .execute()
            .await
            .map_err(|e| map_store_error("Failed to execute search", e))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| map_store_error("Failed to read result stream", e))?
        {
            hits.extend(parse_search_batch(collection, &batch)?);
        }

        debug!("Parsed {} search results", hits.len());
        Ok(rank_hits(hits, exclude_id, top_k))
    }

    /// Build an IVF-PQ index for cosine search on the collection
    ///
    /// Training needs a few hundred rows; on smaller tables LanceDB refuses and
    /// searches keep using the exact flat scan.
    #[inline]
    pub async fn create_index(&self, collection: Collection) -> Result<()> {
        debug!("Creating vector index on {}", collection.table_name());

        let table = self.client.open_table(collection).await?;
        table
            .create_index(
                &[VECTOR_COLUMN],
                Index::IvfPq(IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine)),
            )
            .execute()
            .await
            .map_err(|e| map_store_error("Failed to create vector index", e))?;

        info!("Vector index created on {}", collection.table_name());
        Ok(())
    }
}

fn parse_search_batch(collection: Collection, batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = string_column(batch, collection.key_field())?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| RecommenderError::Database("Missing _distance column".to_string()))?;

    Ok((0..batch.num_rows())
        .map(|row| {
            // A zero query vector has no direction; treat it as orthogonal
            let distance = if distances.is_null(row) || distances.value(row).is_nan() {
                1.0
            } else {
                distances.value(row)
            };
            SearchHit {
                id: ids.value(row).to_string(),
                score: 1.0 - distance,
                distance,
            }
        })
        .collect())
}

/// Rows to request for `top_k` hits from a table of `rows` rows
///
/// Never more than the table holds. A result can still come up short when
/// more than [`SEARCH_MARGIN`] duplicate rows land inside the window.
#[inline]
pub fn search_limit(top_k: usize, rows: usize) -> usize {
    top_k.saturating_add(SEARCH_MARGIN).min(rows)
}

/// Drop the excluded id and duplicate ids, order, and cap at `top_k`
#[inline]
pub fn rank_hits(hits: Vec<SearchHit>, exclude_id: Option<&str>, top_k: usize) -> Vec<SearchHit> {
    hits.into_iter()
        .filter(|hit| Some(hit.id.as_str()) != exclude_id)
        .sorted_by(compare_hits)
        .unique_by(|hit| hit.id.clone())
        .take(top_k)
        .collect()
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.id.cmp(&b.id))
}
