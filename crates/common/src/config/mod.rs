//! Configuration management for PaperTrail components
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::errors::Result;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Embedding collaborator configuration
    #[serde(default)]
    #[validate(nested)]
    pub embedding: EmbeddingConfig,

    /// Generation collaborator configuration
    #[serde(default)]
    #[validate(nested)]
    pub generation: GenerationConfig,

    /// Chunking configuration
    #[serde(default)]
    #[validate(nested)]
    pub chunking: ChunkingSettings,

    /// Vector index configuration
    #[serde(default)]
    #[validate(nested)]
    pub index: IndexSettings,

    /// Retrieval configuration
    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalSettings,

    /// Artifact storage configuration
    #[serde(default)]
    pub artifacts: ArtifactSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hash
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GenerationConfig {
    /// Generation provider: openai, static
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_tokens: usize,
}

/// Sentence grouping strategy selected for the chunker
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrouperKind {
    /// Density-based clustering with noise tolerance
    Density,
    /// Consecutive windows of a fixed sentence count
    FixedWindow,
    /// Breaks wherever adjacent sentence similarity drops below a threshold
    Similarity,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ChunkingSettings {
    /// Maximum whitespace-delimited tokens per chunk
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: usize,

    /// Minimum sentences for a density cluster
    #[serde(default = "default_min_cluster_size")]
    #[validate(range(min = 2))]
    pub min_cluster_size: usize,

    /// Grouping strategy
    #[serde(default = "default_grouper")]
    pub grouper: GrouperKind,

    /// Sentences per window (fixed_window grouper)
    #[serde(default = "default_window_size")]
    #[validate(range(min = 1))]
    pub window_size: usize,

    /// Cosine threshold (similarity grouper)
    #[serde(default = "default_similarity_threshold")]
    #[validate(range(min = -1.0, max = 1.0))]
    pub similarity_threshold: f32,

    /// Documents chunked in parallel
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IndexSettings {
    /// HNSW connectivity
    #[serde(default = "default_hnsw_m")]
    #[validate(range(min = 2))]
    pub m: usize,

    /// HNSW construction beam width
    #[serde(default = "default_ef_construction")]
    #[validate(range(min = 1))]
    pub ef_construction: usize,

    /// HNSW query beam width
    #[serde(default = "default_ef_search")]
    #[validate(range(min = 1))]
    pub ef_search: usize,

    /// Seed for level assignment
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalSettings {
    /// Results fetched per sub-query
    #[serde(default = "default_per_query_k")]
    #[validate(range(min = 1))]
    pub per_query_k: usize,

    /// Maximum sub-queries produced by decomposition
    #[serde(default = "default_max_sub_queries")]
    #[validate(range(min = 1))]
    pub max_sub_queries: usize,

    /// Results for a single direct search
    #[serde(default = "default_k")]
    #[validate(range(min = 1))]
    pub default_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactSettings {
    /// Directory holding index, metadata, and grouping files
    #[serde(default = "default_artifact_dir")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_generation_provider() -> String { "openai".to_string() }
fn default_generation_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_generation_timeout() -> u64 { 60 }
fn default_temperature() -> f32 { 0.2 }
fn default_max_output_tokens() -> usize { 1200 }
fn default_max_tokens() -> usize { 800 }
fn default_min_cluster_size() -> usize { 3 }
fn default_grouper() -> GrouperKind { GrouperKind::Density }
fn default_window_size() -> usize { 8 }
fn default_similarity_threshold() -> f32 { 0.55 }
fn default_concurrency() -> usize { 4 }
fn default_hnsw_m() -> usize { 48 }
fn default_ef_construction() -> usize { 512 }
fn default_ef_search() -> usize { 64 }
fn default_seed() -> u64 { 42 }
fn default_per_query_k() -> usize { 5 }
fn default_max_sub_queries() -> usize { 5 }
fn default_k() -> usize { 5 }
fn default_artifact_dir() -> PathBuf { PathBuf::from("data") }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "papertrail".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__CHUNKING__MAX_TOKENS=600
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load and validate in one step
    pub fn load_validated() -> Result<Self> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Generation request timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            endpoint: default_generation_endpoint(),
            api_key: None,
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_output_tokens(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_cluster_size: default_min_cluster_size(),
            grouper: default_grouper(),
            window_size: default_window_size(),
            similarity_threshold: default_similarity_threshold(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            m: default_hnsw_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            seed: default_seed(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            per_query_k: default_per_query_k(),
            max_sub_queries: default_max_sub_queries(),
            default_k: default_k(),
        }
    }
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            directory: default_artifact_dir(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunking: ChunkingSettings::default(),
            index: IndexSettings::default(),
            retrieval: RetrievalSettings::default(),
            artifacts: ArtifactSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
