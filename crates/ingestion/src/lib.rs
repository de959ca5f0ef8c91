//! PaperTrail Ingestion
//!
//! Turns a document table into a searchable artifact set:
//! sentence splitting, embedding-based sentence grouping, token-budgeted
//! chunks, and an HNSW index aligned with the chunk metadata.

pub mod chunker;
pub mod errors;
pub mod grouping;
pub mod pipeline;
pub mod sentences;

pub use chunker::{Chunker, ChunkingConfig, SentenceChunk};
pub use errors::{IngestionError, IngestionResult};
pub use grouping::{
    grouper_from_settings, DensityGrouper, FixedWindowGrouper, SentenceGrouper,
    SimilarityThresholdGrouper,
};
pub use pipeline::{build_index, BuiltIndex, IndexOutcome, IndexedChunk, IndexingPipeline, PipelineReport};
