
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::recommender::Strategy;

pub const APP_DIR_NAME: &str = "teammate-recommender";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB location; defaults to `<base_dir>/vectors`
    pub uri: Option<String>,
    pub embedding_dimension: usize,
    pub nprobes: usize,
    pub refine_factor: Option<u32>,
    pub query_timeout_secs: u64,
    /// Blocking workers used by the exhaustive team scan
    pub scan_workers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            nprobes: 10,
            refine_factor: None,
            query_timeout_secs: 30,
            scan_workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendConfig {
    pub strategy: Strategy,
    pub default_top_k: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Gap,
            default_top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub generation_model: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            generation_model: "llama3.1:latest".to_string(),
            timeout_secs: 60,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid nprobes: {0} (must be between 1 and 1024)")]
    InvalidNprobes(usize),
    #[error("Invalid refine factor: {0} (must be between 1 and 100)")]
    InvalidRefineFactor(u32),
    #[error("Invalid query timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidQueryTimeout(u64),
    #[error("Invalid scan worker count: {0} (must be between 1 and 64)")]
    InvalidScanWorkers(usize),
    #[error("Invalid default top-k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvValue { name: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default application directory, `<platform config dir>/teammate-recommender`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, then apply environment overrides
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .apply_env_overrides(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Apply `EMB_DIM`, `RECOMMENDER_STORE_URI`, `OLLAMA_HOST` and `OLLAMA_PORT`
    ///
    /// `lookup` resolves a variable name to its value, if set.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("EMB_DIM") {
            self.store.embedding_dimension =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnvValue {
                        name: "EMB_DIM".to_string(),
                        value: value.clone(),
                    })?;
        }

        if let Some(uri) = lookup("RECOMMENDER_STORE_URI").filter(|uri| !uri.trim().is_empty()) {
            self.store.uri = Some(uri);
        }

        if let Some(host) = lookup("OLLAMA_HOST").filter(|host| !host.trim().is_empty()) {
            self.ollama.host = host;
        }

        if let Some(value) = lookup("OLLAMA_PORT") {
            self.ollama.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: "OLLAMA_PORT".to_string(),
                    value: value.clone(),
                })?;
        }

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.recommend.validate()?;
        self.ollama.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the local vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=1024).contains(&self.nprobes) {
            return Err(ConfigError::InvalidNprobes(self.nprobes));
        }

        if let Some(refine_factor) = self.refine_factor {
            if !(1..=100).contains(&refine_factor) {
                return Err(ConfigError::InvalidRefineFactor(refine_factor));
            }
        }

        if !(1..=600).contains(&self.query_timeout_secs) {
            return Err(ConfigError::InvalidQueryTimeout(self.query_timeout_secs));
        }

        if !(1..=64).contains(&self.scan_workers) {
            return Err(ConfigError::InvalidScanWorkers(self.scan_workers));
        }

        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: usize) -> Result<(), ConfigError> {
        if !(2..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }

    pub fn set_nprobes(&mut self, nprobes: usize) -> Result<(), ConfigError> {
        if !(1..=1024).contains(&nprobes) {
            return Err(ConfigError::InvalidNprobes(nprobes));
        }
        self.nprobes = nprobes;
        Ok(())
    }
}

impl RecommendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.default_top_k) {
            return Err(ConfigError::InvalidTopK(self.default_top_k));
        }
        Ok(())
    }

    pub fn set_default_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.default_top_k = top_k;
        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.ollama_url()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_generation_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.generation_model = model;
        Ok(())
    }
}
