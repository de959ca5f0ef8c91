//! Retrieval over a loaded artifact set
//!
//! - Single-query vector search against the HNSW index
//! - Multi-query aggregation for decomposed questions
//! - Cross-query deduplication and distance ordering

mod dedup;
mod index;
mod multi;

pub use dedup::{dedup_results, DedupKey};
pub use index::IndexRetriever;
pub use multi::retrieve_all;

use async_trait::async_trait;
use papertrail_common::errors::Result;
use papertrail_common::models::SearchResult;

/// Common trait for retrievers
#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `k` results for `query`, ascending by distance, ranks 1-based
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;
}
