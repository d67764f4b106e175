#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{EmbeddingGenerator, skills_to_text};
use crate::RecommenderError;
use crate::config::Config;
use crate::hackathon::{DreamTeam, SkillSuggester, dream_team_prompt};
use crate::recommender::vector::normalize;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking Ollama HTTP client for embeddings and skill suggestions
///
/// The async trait impls move each call onto the blocking pool.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.ollama.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.ollama.embedding_model.clone(),
            generation_model: config.ollama.generation_model.clone(),
            dimension: config.store.embedding_dimension,
            agent,
            retry_attempts: config.ollama.retry_attempts.max(1),
            retry_base_delay: Duration::from_secs(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on each further attempt
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Test connection to Ollama server and verify both models are pulled
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;
        for model in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| &m.name == model) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Raw embedding of `text` as returned by the model
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: vec![text],
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let embedding = embed_response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no vectors"))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Normalized embedding of a skill list
    ///
    /// An empty list maps to the zero vector without calling the model.
    #[inline]
    pub fn embed_skills(&self, skills: &[String]) -> Result<Vec<f32>> {
        let text = skills_to_text(skills);
        if text.is_empty() {
            debug!("Empty skill list, using the zero vector");
            return Ok(vec![0.0; self.dimension]);
        }

        let embedding = self.embed_text(&text)?;
        if embedding.len() != self.dimension {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            })
            .with_context(|| format!("Model {} returned an unexpected size", self.embedding_model));
        }

        Ok(normalize(embedding))
    }

    /// Ask the generation model for a JSON answer to `prompt`
    #[inline]
    pub fn generate_json(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.generation_model,
            prompt,
            stream: false,
            format: "json",
        };

        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate response")?;

        let generate_response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        Ok(generate_response.response)
    }

    /// Dream-team skills for a flattened hackathon document
    #[inline]
    pub fn suggest_dream_team(&self, context: &str) -> Result<DreamTeam> {
        let answer = self.generate_json(&dream_team_prompt(context))?;
        let mut team: DreamTeam = serde_json::from_str(&answer)
            .with_context(|| format!("Model answer is not a skill list: {}", answer))?;

        team.required_skills.retain(|skill| !skill.trim().is_empty());
        if team.required_skills.is_empty() {
            return Err(anyhow::anyhow!(
                "Model suggested no skills for {}",
                team.hackathon_name
            ));
        }

        debug!(
            "Suggested {} skills for {}",
            team.required_skills.len(),
            team.hackathon_name
        );
        Ok(team)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self
                            .retry_base_delay
                            .saturating_mul(EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

async fn run_blocking<T, F>(client: &OllamaClient, call: F) -> crate::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&OllamaClient) -> Result<T> + Send + 'static,
{
    let client = client.clone();
    tokio::task::spawn_blocking(move || call(&client))
        .await
        .map_err(|e| RecommenderError::Embedding(format!("Ollama worker failed: {}", e)))?
        .map_err(|e| RecommenderError::Embedding(format!("{:#}", e)))
}

#[async_trait]
impl EmbeddingGenerator for OllamaClient {
    #[inline]
    async fn skills_to_vector(&self, skills: &[String]) -> crate::Result<Vec<f32>> {
        let skills = skills.to_vec();
        run_blocking(self, move |client| client.embed_skills(&skills)).await
    }
}

#[async_trait]
impl SkillSuggester for OllamaClient {
    #[inline]
    async fn suggest_skills(&self, context: &str) -> crate::Result<DreamTeam> {
        let context = context.to_string();
        run_blocking(self, move |client| client.suggest_dream_team(&context)).await
    }
}
