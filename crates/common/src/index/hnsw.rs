//! Hierarchical Navigable Small World graph over squared Euclidean distance
//!
//! Nodes are stored in insertion order, so a node's id is its position.
//! Level assignment uses a seeded LCG, which keeps builds reproducible and
//! lets the generator state travel with the serialized index.
//!
//! Searches take `&self` and never mutate, so a loaded index can be shared
//! behind an `Arc` and queried concurrently.

use super::distance::squared_euclidean;
use super::{Neighbor, VectorIndex};
use crate::config::IndexSettings;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

const MAX_LEVEL: usize = 16;
const FORMAT_VERSION: u32 = 1;

/// Graph construction and query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Links per node on upper layers (layer 0 allows twice as many)
    pub m: usize,
    /// Beam width while inserting
    pub ef_construction: usize,
    /// Beam width while querying (raised to `k` when smaller)
    pub ef_search: usize,
    /// Seed for level assignment
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 48,
            ef_construction: 512,
            ef_search: 64,
            seed: 42,
        }
    }
}

impl From<&IndexSettings> for HnswParams {
    fn from(settings: &IndexSettings) -> Self {
        Self {
            m: settings.m,
            ef_construction: settings.ef_construction,
            ef_search: settings.ef_search,
            seed: settings.seed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    distance: f32,
    id: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    // Ties break on id so result order is stable
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// `links[layer]` holds neighbor ids; `links.len() - 1` is the node's level
    links: Vec<Vec<usize>>,
}

/// HNSW index
#[derive(Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    version: u32,
    params: HnswParams,
    dimension: Option<usize>,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_level: usize,
    rng_state: u64,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("params", &self.params)
            .field("dimension", &self.dimension)
            .field("len", &self.nodes.len())
            .field("max_level", &self.max_level)
            .finish()
    }
}

impl HnswIndex {
    pub fn new(params: HnswParams) -> Self {
        let params = HnswParams {
            m: params.m.max(2),
            ef_construction: params.ef_construction.max(1),
            ef_search: params.ef_search.max(1),
            seed: params.seed,
        };
        Self {
            version: FORMAT_VERSION,
            params,
            dimension: None,
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            rng_state: params.seed,
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Stored vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.nodes.get(position).map(|n| n.vector.as_slice())
    }

    /// Serialize to `path` in place, without the rename `save` performs
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| AppError::artifact(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush().map_err(|e| AppError::artifact(path, e))?;
        Ok(())
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    fn select_level(&mut self) -> usize {
        // LCG random
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = ((self.rng_state >> 33) as f64 / (1u64 << 31) as f64).max(1e-12);

        // level = floor(-ln(uniform) / ln(m))
        let level_mult = 1.0 / (self.params.m as f64).ln();
        let level = (-r.ln() * level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn distance_to(&self, id: usize, query: &[f32]) -> f32 {
        squared_euclidean(&self.nodes[id].vector, query)
    }

    fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(AppError::Validation {
                message: "cannot index an empty vector".to_string(),
                field: Some("vector".to_string()),
            });
        }
        if let Some(expected) = self.dimension {
            if expected != vector.len() {
                return Err(AppError::DimensionMismatch {
                    expected,
                    got: vector.len(),
                });
            }
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(AppError::Validation {
                message: "vector contains non-finite values".to_string(),
                field: Some("vector".to_string()),
            });
        }
        Ok(())
    }

    /// Walk downhill on one layer until no neighbor is closer
    fn greedy_closest(&self, query: &[f32], mut current: usize, layer: usize) -> usize {
        let mut best = self.distance_to(current, query);
        loop {
            let mut changed = false;
            if let Some(links) = self.nodes[current].links.get(layer) {
                for &neighbor in links {
                    let distance = self.distance_to(neighbor, query);
                    if distance < best {
                        best = distance;
                        current = neighbor;
                        changed = true;
                    }
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Beam search on one layer. Returns up to `ef` nodes, nearest first.
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<Scored> {
        let ef = ef.max(1);
        let mut visited = HashSet::new();
        visited.insert(entry);

        let first = Scored {
            distance: self.distance_to(entry, query),
            id: entry,
        };
        let mut candidates = BinaryHeap::from([Reverse(first)]);
        let mut results = BinaryHeap::from([first]);

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map_or(f32::INFINITY, |s| s.distance);
            if current.distance > worst && results.len() >= ef {
                break;
            }

            let Some(links) = self.nodes[current.id].links.get(layer) else {
                continue;
            };

            for &neighbor in links {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance_to(neighbor, query);
                let worst = results.peek().map_or(f32::INFINITY, |s| s.distance);
                if results.len() < ef || distance < worst {
                    let scored = Scored { distance, id: neighbor };
                    candidates.push(Reverse(scored));
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found = results.into_vec();
        found.sort();
        found
    }

    /// Keep only the `max_links` nearest neighbors of `id` on `layer`
    fn prune(&mut self, id: usize, layer: usize, max_links: usize) {
        let base = &self.nodes[id].vector;
        let mut scored: Vec<Scored> = self.nodes[id].links[layer]
            .iter()
            .map(|&neighbor| Scored {
                distance: squared_euclidean(base, &self.nodes[neighbor].vector),
                id: neighbor,
            })
            .collect();

        scored.sort();
        scored.truncate(max_links);
        self.nodes[id].links[layer] = scored.into_iter().map(|s| s.id).collect();
    }

    /// Reject files whose links or entry point reference missing nodes
    fn check_integrity(&self, path: &Path) -> Result<()> {
        let corrupt = |message: String| AppError::IndexCorrupt {
            message: format!("{}: {}", path.display(), message),
        };

        if self.version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        match (self.entry_point, self.nodes.is_empty()) {
            (None, true) => {}
            (Some(entry), false) if entry < self.nodes.len() => {}
            _ => return Err(corrupt("entry point does not match node list".to_string())),
        }

        for (id, node) in self.nodes.iter().enumerate() {
            if Some(node.vector.len()) != self.dimension {
                return Err(corrupt(format!("node {} has wrong dimension", id)));
            }
            if node.links.is_empty() || node.links.len() > MAX_LEVEL + 1 {
                return Err(corrupt(format!("node {} has invalid level", id)));
            }
            if node.links.iter().flatten().any(|&n| n >= self.nodes.len()) {
                return Err(corrupt(format!("node {} links past the end", id)));
            }
        }
        Ok(())
    }
}

impl Default for HnswIndex {
    fn default() -> Self {
        Self::new(HnswParams::default())
    }
}

impl VectorIndex for HnswIndex {
    fn build(vectors: &[Vec<f32>], params: &HnswParams) -> Result<Self> {
        let mut index = Self::new(*params);
        for vector in vectors {
            index.add(vector)?;
        }

        debug!(
            vectors = index.len(),
            max_level = index.max_level,
            m = index.params.m,
            ef_construction = index.params.ef_construction,
            "HNSW index built"
        );
        Ok(index)
    }

    fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.validate_vector(vector)?;
        self.dimension.get_or_insert(vector.len());

        let id = self.nodes.len();
        let level = self.select_level();
        self.nodes.push(Node {
            vector: vector.to_vec(),
            links: vec![Vec::new(); level + 1],
        });

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return Ok(id);
        };

        // Descend through layers above the new node's level
        for layer in (level + 1..=self.max_level).rev() {
            entry = self.greedy_closest(vector, entry, layer);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(vector, entry, self.params.ef_construction, layer);
            let selected: Vec<usize> = candidates
                .iter()
                .filter(|s| s.id != id)
                .take(self.params.m)
                .map(|s| s.id)
                .collect();

            let max_links = self.max_links(layer);
            for &neighbor in &selected {
                self.nodes[neighbor].links[layer].push(id);
                if self.nodes[neighbor].links[layer].len() > max_links {
                    self.prune(neighbor, layer, max_links);
                }
            }
            self.nodes[id].links[layer] = selected;

            if let Some(nearest) = candidates.first() {
                entry = nearest.id;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }

        Ok(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(mut entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(AppError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        for layer in (1..=self.max_level).rev() {
            entry = self.greedy_closest(query, entry, layer);
        }

        let ef = self.params.ef_search.max(k);
        Ok(self
            .search_layer(query, entry, ef, 0)
            .into_iter()
            .take(k)
            .map(|s| Neighbor {
                position: s.id,
                distance: s.distance,
            })
            .collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        // Write to a sibling file first so a partial write never replaces a good index
        let tmp = path.with_extension("hnsw.tmp");
        self.write_to(&tmp)?;
        std::fs::rename(&tmp, path).map_err(|e| AppError::artifact(path, e))?;

        debug!(path = %path.display(), vectors = self.len(), "HNSW index saved");
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::IndexNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path).map_err(|e| AppError::artifact(path, e))?;
        let index: HnswIndex =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| AppError::IndexCorrupt {
                message: format!("{}: {}", path.display(), e),
            })?;
        index.check_integrity(path)?;

        debug!(path = %path.display(), vectors = index.len(), "HNSW index loaded");
        Ok(index)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_params() -> HnswParams {
        HnswParams {
            m: 16,
            ef_construction: 100,
            ef_search: 64,
            seed: 7,
        }
    }

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect()
    }

    fn brute_force(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<usize> {
        let mut scored: Vec<(f32, usize)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (squared_euclidean(v, query), i))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn test_search_empty_index() {
        let index = HnswIndex::new(small_params());
        assert!(index.search(&[1.0, 0.0], 10).unwrap().is_empty());
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_positions_follow_insertion_order() {
        let mut index = HnswIndex::new(small_params());
        assert_eq!(index.add(&[1.0, 0.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 1.0, 0.0]).unwrap(), 1);
        assert_eq!(index.add(&[0.0, 0.0, 1.0]).unwrap(), 2);

        let hits = index.search(&[0.0, 0.9, 0.1], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].position, 1);
        assert_eq!(index.vector(1), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn test_exact_match_has_zero_distance() {
        let vectors = random_vectors(50, 8, 1);
        let index = HnswIndex::build(&vectors, &small_params()).unwrap();

        let hits = index.search(&vectors[17], 3).unwrap();
        assert_eq!(hits[0].position, 17);
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_never_returns_more_than_k() {
        let vectors = random_vectors(5, 4, 2);
        let index = HnswIndex::build(&vectors, &small_params()).unwrap();

        assert_eq!(index.search(&vectors[0], 3).unwrap().len(), 3);
        assert_eq!(index.search(&vectors[0], 50).unwrap().len(), 5);
        assert!(index.search(&vectors[0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = HnswIndex::new(small_params());
        index.add(&[1.0, 0.0, 0.0]).unwrap();

        assert!(matches!(
            index.add(&[1.0, 0.0]),
            Err(AppError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(AppError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn test_rejects_invalid_vectors() {
        let mut index = HnswIndex::new(small_params());
        assert!(index.add(&[]).is_err());
        assert!(index.add(&[f32::NAN, 1.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_recall_against_brute_force() {
        let vectors = random_vectors(600, 16, 11);
        let queries = random_vectors(30, 16, 12);
        let index = HnswIndex::build(&vectors, &small_params()).unwrap();

        let k = 10;
        let mut found = 0;
        for query in &queries {
            let expected = brute_force(&vectors, query, k);
            let hits: HashSet<usize> = index
                .search(query, k)
                .unwrap()
                .into_iter()
                .map(|n| n.position)
                .collect();
            found += expected.iter().filter(|p| hits.contains(p)).count();
        }

        let recall = found as f32 / (queries.len() * k) as f32;
        assert!(recall >= 0.9, "recall too low: {}", recall);
    }

    #[test]
    fn test_builds_are_reproducible() {
        let vectors = random_vectors(100, 8, 3);
        let a = HnswIndex::build(&vectors, &small_params()).unwrap();
        let b = HnswIndex::build(&vectors, &small_params()).unwrap();

        let query = &vectors[42];
        assert_eq!(a.search(query, 5).unwrap(), b.search(query, 5).unwrap());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.hnsw");
        let vectors = random_vectors(80, 8, 5);
        let index = HnswIndex::build(&vectors, &small_params()).unwrap();
        index.save(&path).unwrap();

        let loaded = HnswIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 80);
        assert_eq!(loaded.dimension(), Some(8));
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(loaded.vector(i), Some(v.as_slice()));
        }
        assert_eq!(
            index.search(&vectors[3], 4).unwrap(),
            loaded.search(&vectors[3], 4).unwrap()
        );
        assert!(!path.with_extension("hnsw.tmp").exists());
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.hnsw");
        assert!(matches!(
            HnswIndex::load(&missing),
            Err(AppError::IndexNotFound { .. })
        ));

        let garbage = dir.path().join("garbage.hnsw");
        std::fs::write(&garbage, b"not an index").unwrap();
        assert!(matches!(
            HnswIndex::load(&garbage),
            Err(AppError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn test_level_distribution() {
        let mut index = HnswIndex::new(small_params());
        let mut levels = [0u32; MAX_LEVEL + 1];

        for _ in 0..10000 {
            levels[index.select_level()] += 1;
        }

        // Most should be level 0
        assert!(levels[0] > 8000, "level 0 should dominate: {:?}", levels);
        assert!(levels[0] > levels[1]);
        assert!(levels[1] >= levels[2]);
    }
}
