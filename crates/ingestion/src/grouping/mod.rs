//! Sentence grouping strategies
//!
//! A grouper turns per-sentence embeddings into an ordered partition of
//! sentence indices. The chunker owns token budgets and fallbacks; a grouper
//! only decides which sentences belong together.

mod density;

use papertrail_common::config::{ChunkingSettings, GrouperKind};
use papertrail_common::errors::{AppError, Result};
use papertrail_common::index::distance::cosine_similarity;
use std::sync::Arc;

/// Partition sentence embeddings into groups of sentence indices.
///
/// Every index in `0..embeddings.len()` must appear in exactly one group,
/// ascending within the group.
pub trait SentenceGrouper: Send + Sync {
    fn group(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<usize>>>;

    fn name(&self) -> &'static str;
}

/// Density clustering; noise sentences become singleton groups after the clusters
#[derive(Debug, Clone)]
pub struct DensityGrouper {
    min_cluster_size: usize,
}

impl DensityGrouper {
    pub fn new(min_cluster_size: usize) -> Self {
        Self {
            min_cluster_size: min_cluster_size.max(2),
        }
    }
}

impl Default for DensityGrouper {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SentenceGrouper for DensityGrouper {
    fn group(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<usize>>> {
        let labels = density::cluster(embeddings, self.min_cluster_size, true)?;

        let cluster_count = labels.iter().flatten().max().map_or(0, |m| m + 1);
        let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); cluster_count];
        let mut noise = Vec::new();

        for (sentence, label) in labels.into_iter().enumerate() {
            match label {
                Some(label) => clusters[label].push(sentence),
                None => noise.push(vec![sentence]),
            }
        }

        clusters.retain(|c| !c.is_empty());
        clusters.extend(noise);
        Ok(clusters)
    }

    fn name(&self) -> &'static str {
        "density"
    }
}

/// Consecutive runs of `window` sentences
#[derive(Debug, Clone)]
pub struct FixedWindowGrouper {
    window: usize,
}

impl FixedWindowGrouper {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl SentenceGrouper for FixedWindowGrouper {
    fn group(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<usize>>> {
        let indices: Vec<usize> = (0..embeddings.len()).collect();
        Ok(indices.chunks(self.window).map(<[usize]>::to_vec).collect())
    }

    fn name(&self) -> &'static str {
        "fixed_window"
    }
}

/// Starts a new group wherever adjacent sentences fall below `threshold` cosine similarity
#[derive(Debug, Clone)]
pub struct SimilarityThresholdGrouper {
    threshold: f32,
}

impl SimilarityThresholdGrouper {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl SentenceGrouper for SimilarityThresholdGrouper {
    fn group(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<usize>>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for (i, embedding) in embeddings.iter().enumerate() {
            if i == 0 {
                groups.push(vec![0]);
                continue;
            }

            let similarity = cosine_similarity(&embeddings[i - 1], embedding);
            if !similarity.is_finite() {
                return Err(AppError::Clustering {
                    message: format!("non-finite similarity at sentence {}", i),
                });
            }

            match groups.last_mut() {
                Some(current) if similarity >= self.threshold => current.push(i),
                _ => groups.push(vec![i]),
            }
        }

        Ok(groups)
    }

    fn name(&self) -> &'static str {
        "similarity"
    }
}

/// Build the grouper selected in configuration
pub fn grouper_from_settings(settings: &ChunkingSettings) -> Arc<dyn SentenceGrouper> {
    match settings.grouper {
        GrouperKind::Density => Arc::new(DensityGrouper::new(settings.min_cluster_size)),
        GrouperKind::FixedWindow => Arc::new(FixedWindowGrouper::new(settings.window_size)),
        GrouperKind::Similarity => {
            Arc::new(SimilarityThresholdGrouper::new(settings.similarity_threshold))
        }
    }
}

/// True when `groups` covers `0..n` exactly once
pub(crate) fn is_partition(groups: &[Vec<usize>], n: usize) -> bool {
    let mut seen = vec![false; n];
    for &index in groups.iter().flatten() {
        if index >= n || seen[index] {
            return false;
        }
        seen[index] = true;
    }
    seen.into_iter().all(|s| s)
}
