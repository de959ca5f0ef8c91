//! PaperTrail Common Library
//!
//! Shared code for all PaperTrail components including:
//! - Document and chunk data model
//! - Embedding and generation collaborator abstractions
//! - Approximate nearest-neighbor index (HNSW)
//! - Artifact persistence (index, metadata, per-document grouping)
//! - Error types and handling
//! - Configuration management
//! - Progress events, metrics, and logging setup

pub mod artifacts;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod index;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod telemetry;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use generation::Generator;
pub use index::{HnswIndex, VectorIndex};
pub use models::{ChunkRecord, CitationEntry, Document, SearchResult};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
