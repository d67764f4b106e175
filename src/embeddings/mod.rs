// Embeddings module
// Turns skill lists into normalized vectors through an external model

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use ollama::OllamaClient;

/// Produces embedding vectors from skill lists
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// L2-normalized embedding of `skills`; the zero vector is kept as-is
    async fn skills_to_vector(&self, skills: &[String]) -> Result<Vec<f32>>;
}

/// Text sent to the embedding model for a skill list
#[inline]
pub fn skills_to_text(skills: &[String]) -> String {
    skills
        .iter()
        .map(|skill| skill.trim())
        .filter(|skill| !skill.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
