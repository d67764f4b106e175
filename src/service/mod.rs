//! Operations offered to callers, and the skill pipelines feeding them.


use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{Collection, EmbeddingStore};
use crate::embeddings::EmbeddingGenerator;
use crate::hackathon::{DreamTeam, MetadataStore, SkillSuggester, flatten_document};
use crate::recommender::{Recommendation, RecommendationEngine, Strategy};
use crate::{RecommenderError, Result};

pub struct TeammateService {
    store: Arc<EmbeddingStore>,
    engine: RecommendationEngine,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    suggester: Option<Arc<dyn SkillSuggester>>,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl TeammateService {
    #[inline]
    pub fn new(store: Arc<EmbeddingStore>, engine: RecommendationEngine) -> Self {
        Self {
            store,
            engine,
            embedder: None,
            suggester: None,
            metadata: None,
        }
    }

    #[inline]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[inline]
    pub fn with_suggester(mut self, suggester: Arc<dyn SkillSuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    #[inline]
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[inline]
    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    #[inline]
    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    #[inline]
    pub async fn upsert_participant(&self, participant_id: &str, vector: Vec<f32>) -> Result<()> {
        self.store
            .upsert(Collection::Participants, participant_id, vector)
            .await
    }

    #[inline]
    pub async fn upsert_hackathon(&self, hackathon_id: &str, vector: Vec<f32>) -> Result<()> {
        self.store
            .upsert(Collection::Hackathons, hackathon_id, vector)
            .await
    }

    #[inline]
    pub async fn recommend(
        &self,
        participant_id: &str,
        hackathon_id: &str,
        top_k: i64,
    ) -> Result<Vec<Recommendation>> {
        self.engine
            .recommend(participant_id, hackathon_id, top_k)
            .await
    }

    #[inline]
    pub async fn recommend_with(
        &self,
        strategy: Strategy,
        participant_id: &str,
        hackathon_id: &str,
        top_k: i64,
    ) -> Result<Vec<Recommendation>> {
        self.engine
            .recommend_with(strategy, participant_id, hackathon_id, top_k)
            .await
    }

    /// Remove every record of the named collection
    ///
    /// `collection_name` is matched case-insensitively against
    /// `participants` and `hackathons`.
    #[inline]
    pub async fn delete_all(&self, collection_name: &str) -> Result<u64> {
        let collection: Collection = collection_name.parse()?;
        self.store.delete_all(collection).await
    }

    /// Embedding of `skills` from the configured generator
    #[inline]
    pub async fn embed_skills(&self, skills: &[String]) -> Result<Vec<f32>> {
        self.embedder()?.skills_to_vector(skills).await
    }

    /// Embed `skills` and store them as the participant's profile
    #[inline]
    pub async fn update_participant_skills(
        &self,
        participant_id: &str,
        skills: &[String],
    ) -> Result<Vec<f32>> {
        let vector = self.embed_skills(skills).await?;
        debug!(
            "Embedded {} skills for participant {}",
            skills.len(),
            participant_id
        );
        self.upsert_participant(participant_id, vector.clone())
            .await?;
        Ok(vector)
    }

    /// Embed `skills` and store them as the hackathon's target profile
    #[inline]
    pub async fn update_hackathon_skills(
        &self,
        hackathon_id: &str,
        skills: &[String],
    ) -> Result<Vec<f32>> {
        let vector = self.embed_skills(skills).await?;
        self.upsert_hackathon(hackathon_id, vector.clone()).await?;
        Ok(vector)
    }

    /// Derive the hackathon profile from its document
    ///
    /// The document is flattened, the suggester proposes the team's skills,
    /// and those skills are embedded and stored.
    #[inline]
    pub async fn update_hackathon_from_document(
        &self,
        hackathon_id: &str,
        document: &serde_json::Value,
    ) -> Result<DreamTeam> {
        let suggester = self.suggester.as_ref().ok_or_else(|| {
            RecommenderError::Config("No skill suggester configured".to_string())
        })?;

        let context = flatten_document(document);
        if context.is_empty() {
            return Err(RecommenderError::InvalidArgument(format!(
                "Hackathon document for {} has no content",
                hackathon_id
            )));
        }

        let team = suggester.suggest_skills(&context).await?;
        self.update_hackathon_skills(hackathon_id, &team.required_skills)
            .await?;

        info!(
            "Updated hackathon {} ({}) with {} suggested skills",
            hackathon_id,
            team.hackathon_name,
            team.required_skills.len()
        );
        Ok(team)
    }

    /// Same as [`Self::update_hackathon_from_document`], fetching the
    /// document from the configured metadata store
    #[inline]
    pub async fn update_hackathon_from_metadata(&self, hackathon_id: &str) -> Result<DreamTeam> {
        let metadata = self.metadata.as_ref().ok_or_else(|| {
            RecommenderError::Config("No hackathon metadata store configured".to_string())
        })?;

        let document = metadata.fetch_hackathon_document(hackathon_id).await?;
        self.update_hackathon_from_document(hackathon_id, &document)
            .await
    }

    fn embedder(&self) -> Result<&Arc<dyn EmbeddingGenerator>> {
        self.embedder
            .as_ref()
            .ok_or_else(|| RecommenderError::Config("No embedding generator configured".to_string()))
    }
}
