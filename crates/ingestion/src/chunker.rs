//! Semantic chunking module
//!
//! Splits a document into sentences, embeds them, groups related sentences
//! and enforces the per-chunk token budget. Each chunk carries the mean of
//! its sentences' normalized embeddings.

use crate::grouping::{is_partition, SentenceGrouper};
use crate::sentences::{split_sentences, token_count};
use papertrail_common::config::ChunkingSettings;
use papertrail_common::embeddings::Embedder;
use papertrail_common::errors::{AppError, Result};
use papertrail_common::index::distance::{l2_normalize, mean_of};
use papertrail_common::metrics;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Configuration for semantic chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum whitespace-delimited tokens per chunk
    pub max_tokens: usize,
    /// Documents with fewer sentences are kept whole
    pub min_cluster_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            min_cluster_size: 3,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            min_cluster_size: settings.min_cluster_size,
        }
    }
}

/// One chunk of a document
#[derive(Debug, Clone)]
pub struct SentenceChunk {
    /// Member sentences joined by single spaces
    pub text: String,
    /// Member sentence indices, ascending
    pub sentences: Vec<usize>,
    pub token_count: usize,
    /// Mean of the member sentences' normalized embeddings
    pub embedding: Vec<f32>,
}

pub struct Chunker {
    config: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    grouper: Arc<dyn SentenceGrouper>,
}

impl Chunker {
    pub fn new(
        config: ChunkingConfig,
        embedder: Arc<dyn Embedder>,
        grouper: Arc<dyn SentenceGrouper>,
    ) -> Self {
        Self {
            config,
            embedder,
            grouper,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk one document's text.
    ///
    /// Empty text yields no chunks. Embedding failures propagate, including
    /// vectors of the wrong dimension or with non-finite values; grouping
    /// failures fall back to a single whole-document group.
    #[instrument(skip(self, text), fields(grouper = self.grouper.name(), text_len = text.len()))]
    pub async fn chunk(&self, text: &str) -> Result<Vec<SentenceChunk>> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = self.embedder.embed_batch(&sentences).await?;
        if embeddings.len() != sentences.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "expected {} sentence embeddings, got {}",
                    sentences.len(),
                    embeddings.len()
                ),
            });
        }
        let dimension = self.embedder.dimension();
        for (i, embedding) in embeddings.iter_mut().enumerate() {
            if embedding.len() != dimension {
                return Err(AppError::EmbeddingError {
                    message: format!(
                        "sentence {} embedding has dimension {}, expected {}",
                        i,
                        embedding.len(),
                        dimension
                    ),
                });
            }
            if embedding.iter().any(|v| !v.is_finite()) {
                return Err(AppError::EmbeddingError {
                    message: format!("sentence {} embedding has non-finite values", i),
                });
            }
            l2_normalize(embedding);
        }
        let embeddings = Arc::new(embeddings);

        let whole: Vec<Vec<usize>> = vec![(0..sentences.len()).collect()];
        let groups = if sentences.len() < self.config.min_cluster_size {
            whole
        } else {
            self.group(Arc::clone(&embeddings)).await.unwrap_or(whole)
        };

        let token_counts: Vec<usize> = sentences.iter().map(|s| token_count(s)).collect();
        let groups = split_oversized(groups, &token_counts, self.config.max_tokens);

        let chunks: Vec<SentenceChunk> = groups
            .into_iter()
            .filter_map(|group| {
                let embedding = mean_of(&embeddings, &group)?;
                let token_count = group.iter().map(|&i| token_counts[i]).sum();
                let text = group
                    .iter()
                    .map(|&i| sentences[i].as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(SentenceChunk {
                    text,
                    sentences: group,
                    token_count,
                    embedding,
                })
            })
            .collect();

        debug!(
            sentences = sentences.len(),
            chunk_count = chunks.len(),
            max_tokens = self.config.max_tokens,
            "Text chunked"
        );

        Ok(chunks)
    }

    /// Run the grouper off the async workers. `None` means fall back to one group.
    async fn group(&self, embeddings: Arc<Vec<Vec<f32>>>) -> Option<Vec<Vec<usize>>> {
        let n = embeddings.len();
        let grouper = Arc::clone(&self.grouper);
        let outcome = tokio::task::spawn_blocking(move || grouper.group(&embeddings)).await;

        let failure = match outcome {
            Ok(Ok(mut groups)) if is_partition(&groups, n) => {
                for group in groups.iter_mut() {
                    group.sort_unstable();
                }
                return Some(groups);
            }
            Ok(Ok(_)) => "grouper returned an invalid partition".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("grouping task failed: {}", e),
        };

        warn!(
            grouper = self.grouper.name(),
            sentences = n,
            error = %failure,
            "Sentence grouping failed, keeping document as one chunk"
        );
        metrics::increment("grouping_fallbacks_total");
        None
    }
}

/// Enforce the token budget by packing each oversize group's sentences greedily
/// in order. A single sentence over budget becomes its own chunk.
pub fn split_oversized(
    groups: Vec<Vec<usize>>,
    token_counts: &[usize],
    max_tokens: usize,
) -> Vec<Vec<usize>> {
    let mut result = Vec::with_capacity(groups.len());

    for group in groups {
        let total: usize = group.iter().map(|&i| token_counts[i]).sum();
        if total <= max_tokens {
            result.push(group);
            continue;
        }

        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0;

        for index in group {
            let tokens = token_counts[index];
            if current_tokens + tokens <= max_tokens {
                current.push(index);
                current_tokens += tokens;
                continue;
            }

            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }

            if tokens > max_tokens {
                warn!(
                    sentence = index,
                    tokens = tokens,
                    max_tokens = max_tokens,
                    "Sentence exceeds chunk token budget, emitting as its own chunk"
                );
                metrics::increment("oversize_sentences_total");
                result.push(vec![index]);
                current_tokens = 0;
            } else {
                current.push(index);
                current_tokens = tokens;
            }
        }

        if !current.is_empty() {
            result.push(current);
        }
    }

    result
}
