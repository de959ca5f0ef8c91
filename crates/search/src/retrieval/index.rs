//! Vector search over one loaded index and its metadata
//!
//! The index and metadata are shared read-only behind `Arc`s; `search`
//! takes `&self` all the way down, so concurrent queries need no locking.

use super::Retriever;
use async_trait::async_trait;
use papertrail_common::artifacts::{ArtifactPaths, ArtifactSet};
use papertrail_common::embeddings::Embedder;
use papertrail_common::errors::{AppError, Result};
use papertrail_common::index::VectorIndex;
use papertrail_common::metrics::record_search;
use papertrail_common::models::{ChunkRecord, SearchResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

pub struct IndexRetriever {
    index: Arc<dyn VectorIndex>,
    metadata: Arc<Vec<ChunkRecord>>,
    embedder: Arc<dyn Embedder>,
}

impl IndexRetriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        metadata: Arc<Vec<ChunkRecord>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(AppError::IndexCorrupt {
                message: format!(
                    "index holds {} vectors but metadata lists {} chunks",
                    index.len(),
                    metadata.len()
                ),
            });
        }

        Ok(Self {
            index,
            metadata,
            embedder,
        })
    }

    /// Wrap a loaded artifact set, checking it against the query embedder
    pub fn from_artifacts(set: ArtifactSet, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(dimension) = set.index.dimension() {
            if dimension != embedder.dimension() {
                return Err(AppError::DimensionMismatch {
                    expected: dimension,
                    got: embedder.dimension(),
                });
            }
        }

        if let Some(manifest) = &set.manifest {
            if manifest.embedding_model != embedder.model_name() {
                warn!(
                    index_model = %manifest.embedding_model,
                    query_model = embedder.model_name(),
                    "Query embedder differs from the one used to build the index"
                );
            }
        }

        Self::new(Arc::new(set.index), Arc::new(set.metadata), embedder)
    }

    /// Load `{base}` artifacts. A missing index is a hard error.
    pub fn load(paths: &ArtifactPaths, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let set = ArtifactSet::load(paths)?;
        info!(
            index = %paths.index.display(),
            chunks = set.len(),
            "Artifacts loaded"
        );
        Self::from_artifacts(set, embedder)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn metadata(&self) -> &[ChunkRecord] {
        &self.metadata
    }

    /// Search with a precomputed query vector
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = self.index.search(query, k)?;
        let found = neighbors.len();

        let results: Vec<SearchResult> = neighbors
            .into_iter()
            .filter_map(|n| {
                let chunk = self.metadata.get(n.position)?;
                Some(SearchResult {
                    chunk: chunk.clone(),
                    position: n.position,
                    distance: n.distance,
                    rank: None,
                })
            })
            .take(k)
            .enumerate()
            .map(|(i, mut result)| {
                result.rank = Some(i + 1);
                result
            })
            .collect();

        if results.len() < found.min(k) {
            warn!(
                dropped = found - results.len(),
                metadata_len = self.metadata.len(),
                "Dropped hits outside metadata bounds"
            );
        }

        Ok(results)
    }
}

#[async_trait]
impl Retriever for IndexRetriever {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let embedding = self.embedder.embed(query).await?;
        let results = self.search_vector(&embedding, k)?;
        record_search(start.elapsed().as_secs_f64(), results.len());
        Ok(results)
    }
}
