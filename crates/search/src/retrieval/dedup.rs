//! Merging results from several searches
//!
//! The identity of a hit is its chunk id. Metadata written before chunk ids
//! existed falls back to (DOI or title, SHA-256 of the chunk text), which
//! merges distinct chunks that happen to share text.

use papertrail_common::metrics;
use papertrail_common::models::SearchResult;
use sha2::{Digest, Sha256};
use std::collections::hash_map::{Entry, HashMap};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Chunk(Uuid),
    Content { source: String, text_hash: String },
}

impl DedupKey {
    pub fn of(result: &SearchResult) -> Self {
        match result.chunk.chunk_id {
            Some(id) => DedupKey::Chunk(id),
            None => DedupKey::Content {
                source: result
                    .chunk
                    .doi()
                    .unwrap_or(&result.chunk.paper_title)
                    .to_string(),
                text_hash: hex::encode(Sha256::digest(result.chunk.text.as_bytes())),
            },
        }
    }
}

/// Keep the lowest-distance copy per key, then sort ascending by distance.
///
/// Equal distances keep first-seen order. Ranks are reassigned over the merged list.
pub fn dedup_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let total = results.len();
    let mut slots: HashMap<DedupKey, usize> = HashMap::with_capacity(total);
    let mut kept: Vec<SearchResult> = Vec::with_capacity(total);

    for result in results {
        match slots.entry(DedupKey::of(&result)) {
            Entry::Occupied(slot) => {
                let slot = *slot.get();
                if result.distance < kept[slot].distance {
                    kept[slot] = result;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(result);
            }
        }
    }

    kept.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    for (i, result) in kept.iter_mut().enumerate() {
        result.rank = Some(i + 1);
    }

    let collisions = total - kept.len();
    if collisions > 0 {
        metrics::increment_by("dedup_collisions_total", collisions as u64);
    }
    debug!(total = total, unique = kept.len(), "Results deduplicated");

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrail_common::models::ChunkRecord;

    fn result(doi: Option<&str>, text: &str, distance: f32, chunk_id: Option<Uuid>) -> SearchResult {
        SearchResult {
            chunk: ChunkRecord {
                text: text.to_string(),
                paper_title: "Title".to_string(),
                doi: doi.map(str::to_string),
                source: "core".to_string(),
                year_published: 2021,
                chunk_index_in_doc: 0,
                chunk_id,
            },
            position: 0,
            distance,
            rank: None,
        }
    }

    #[test]
    fn test_keeps_lower_distance_copy() {
        let merged = dedup_results(vec![
            result(Some("10.1/x"), "same text", 0.5, None),
            result(Some("10.1/y"), "other", 0.3, None),
            result(Some("10.1/x"), "same text", 0.2, None),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].distance, 0.2);
        assert_eq!(merged[0].chunk.doi(), Some("10.1/x"));
        assert_eq!(merged[1].distance, 0.3);
        assert_eq!(merged[0].rank, Some(1));
        assert_eq!(merged[1].rank, Some(2));
    }

    #[test]
    fn test_first_copy_survives_when_not_worse() {
        let mut first = result(Some("10.1/x"), "text", 0.4, None);
        first.position = 7;
        let mut second = result(Some("10.1/x"), "text", 0.4, None);
        second.position = 9;

        let merged = dedup_results(vec![first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].position, 7);
    }

    #[test]
    fn test_chunk_id_takes_precedence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = dedup_results(vec![
            result(Some("10.1/x"), "dup", 0.1, Some(a)),
            result(Some("10.1/x"), "dup", 0.2, Some(b)),
            result(Some("10.1/x"), "dup", 0.05, Some(a)),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk.chunk_id, Some(a));
        assert_eq!(merged[0].distance, 0.05);
    }

    #[test]
    fn test_title_used_without_doi() {
        let key = DedupKey::of(&result(None, "abc", 0.1, None));
        match key {
            DedupKey::Content { source, text_hash } => {
                assert_eq!(source, "Title");
                assert_eq!(text_hash.len(), 64);
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_sorted_ascending() {
        let merged = dedup_results(vec![
            result(Some("a"), "1", 0.9, None),
            result(Some("b"), "2", 0.1, None),
            result(Some("c"), "3", 0.5, None),
        ]);
        let distances: Vec<f32> = merged.iter().map(|r| r.distance).collect();
        assert_eq!(distances, vec![0.1, 0.5, 0.9]);
    }
}
