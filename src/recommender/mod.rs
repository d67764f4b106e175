
pub mod top_k;
pub mod vector;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{
    Collection, EmbeddingRecord, EmbeddingStore, SearchHit, SearchParams, SimilarityIndex,
};
use crate::{RecommenderError, Result};

pub use top_k::{Candidate, TopK};

/// How candidates are ranked for a participant and hackathon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Nearest participants to `normalize(T - P)`, answered by the vector index
    Gap,
    /// Every pairing scored by `cosine(normalize(P + Q), T)`
    Team,
}

impl fmt::Display for Strategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap => write!(f, "gap"),
            Self::Team => write!(f, "team"),
        }
    }
}

impl FromStr for Strategy {
    type Err = RecommenderError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gap" => Ok(Self::Gap),
            "team" => Ok(Self::Team),
            other => Err(RecommenderError::InvalidArgument(format!(
                "Unknown strategy '{}' (expected 'gap' or 'team')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub score: f32,
    pub distance: f32,
}

impl From<SearchHit> for Recommendation {
    #[inline]
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            distance: hit.distance,
        }
    }
}

impl From<Candidate> for Recommendation {
    #[inline]
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            score: candidate.score,
            distance: 1.0 - candidate.score,
        }
    }
}

pub struct RecommendationEngine {
    store: Arc<EmbeddingStore>,
    index: SimilarityIndex,
    strategy: Strategy,
    scan_workers: usize,
}

impl RecommendationEngine {
    #[inline]
    pub fn new(
        store: Arc<EmbeddingStore>,
        index: SimilarityIndex,
        strategy: Strategy,
        scan_workers: usize,
    ) -> Self {
        Self {
            store,
            index,
            strategy,
            scan_workers: scan_workers.max(1),
        }
    }

    /// Engine over `store` with search and ranking settings from `config`
    #[inline]
    pub fn from_config(store: Arc<EmbeddingStore>, config: &Config) -> Self {
        let index = SimilarityIndex::new(
            Arc::clone(store.client()),
            store.dimension(),
            SearchParams::from_config(&config.store),
        );
        Self::new(
            store,
            index,
            config.recommend.strategy,
            config.store.scan_workers,
        )
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[inline]
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Recommend teammates with the default strategy
    #[inline]
    pub async fn recommend(
        &self,
        participant_id: &str,
        hackathon_id: &str,
        top_k: i64,
    ) -> Result<Vec<Recommendation>> {
        self.recommend_with(self.strategy, participant_id, hackathon_id, top_k)
            .await
    }

    /// Recommend up to `top_k` teammates for `participant_id` at `hackathon_id`
    ///
    /// The participant never appears in its own results. A non-positive
    /// `top_k` yields an empty list without reading the store; a missing
    /// participant or hackathon fails the whole request with `NotFound`.
    #[inline]
    pub async fn recommend_with(
        &self,
        strategy: Strategy,
        participant_id: &str,
        hackathon_id: &str,
        top_k: i64,
    ) -> Result<Vec<Recommendation>> {
        if top_k <= 0 {
            debug!("top_k {} requested, returning no recommendations", top_k);
            return Ok(Vec::new());
        }
        let top_k = usize::try_from(top_k).unwrap_or(usize::MAX);

        let (participant, hackathon) = tokio::try_join!(
            self.store.get(Collection::Participants, participant_id),
            self.store.get(Collection::Hackathons, hackathon_id),
        )?;

        let recommendations = match strategy {
            Strategy::Gap => self.recommend_by_gap(&participant, &hackathon, top_k).await?,
            Strategy::Team => self.recommend_by_team(participant, hackathon, top_k).await?,
        };

        info!(
            "Recommended {} teammates for {} at {} ({} strategy)",
            recommendations.len(),
            participant_id,
            hackathon_id,
            strategy
        );
        Ok(recommendations)
    }

    async fn recommend_by_gap(
        &self,
        participant: &EmbeddingRecord,
        hackathon: &EmbeddingRecord,
        top_k: usize,
    ) -> Result<Vec<Recommendation>> {
        let gap = vector::gap_vector(&hackathon.vector, &participant.vector)?;
        if vector::l2_norm(&gap) == 0.0 {
            // Every candidate is orthogonal to a zero gap, so only the id order remains
            debug!(
                "{} already matches the hackathon profile, ranking candidates by id",
                participant.id
            );
            let ids = self.store.list_ids(Collection::Participants).await?;
            return Ok(ids
                .into_iter()
                .filter(|id| *id != participant.id)
                .take(top_k)
                .map(|id| Recommendation {
                    id,
                    score: 0.0,
                    distance: 1.0,
                })
                .collect());
        }

        let hits = self
            .index
            .search(Collection::Participants, &gap, Some(&participant.id), top_k)
            .await?;
        Ok(hits.into_iter().map(Recommendation::from).collect())
    }

    async fn recommend_by_team(
        &self,
        participant: EmbeddingRecord,
        hackathon: EmbeddingRecord,
        top_k: usize,
    ) -> Result<Vec<Recommendation>> {
        let mut candidates = self.store.scan(Collection::Participants).await?;
        candidates.retain(|record| record.id != participant.id);

        // Duplicate rows for one id keep only the newest
        candidates.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        candidates.dedup_by(|later, kept| later.id == kept.id);

        let shard_size = candidates.len().div_ceil(self.scan_workers).max(1);
        debug!(
            "Scoring {} candidates in shards of {}",
            candidates.len(),
            shard_size
        );

        let participant = Arc::new(participant.vector);
        let hackathon = Arc::new(hackathon.vector);
        let mut handles = Vec::with_capacity(self.scan_workers);
        while !candidates.is_empty() {
            let rest = candidates.split_off(shard_size.min(candidates.len()));
            let shard = std::mem::replace(&mut candidates, rest);
            let participant = Arc::clone(&participant);
            let hackathon = Arc::clone(&hackathon);
            handles.push(tokio::task::spawn_blocking(move || {
                rank_team_candidates(&participant, &hackathon, &shard, top_k)
            }));
        }

        let mut best = TopK::new(top_k);
        for shard in futures::future::try_join_all(handles)
            .await
            .map_err(|e| RecommenderError::Other(anyhow::anyhow!("Scan worker failed: {}", e)))?
        {
            best = best.merge(shard?);
        }

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(Recommendation::from)
            .collect())
    }
}

/// How well `participant` and `candidate` together cover `hackathon`
#[inline]
pub fn team_score(participant: &[f32], candidate: &[f32], hackathon: &[f32]) -> Result<f32> {
    let team = vector::team_vector(participant, candidate)?;
    vector::cosine(&team, hackathon)
}

/// Best `top_k` candidates by [`team_score`]
#[inline]
pub fn rank_team_candidates(
    participant: &[f32],
    hackathon: &[f32],
    candidates: &[EmbeddingRecord],
    top_k: usize,
) -> Result<TopK> {
    let mut best = TopK::new(top_k);
    for candidate in candidates {
        let score = team_score(participant, &candidate.vector, hackathon)?;
        best.push(Candidate::new(candidate.id.clone(), score));
    }
    Ok(best)
}
