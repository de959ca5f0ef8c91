//! Approximate nearest-neighbor index capability
//!
//! The index is keyed purely by insertion position: the `i`-th vector added
//! is reported as position `i`, which lines up with entry `i` of the
//! metadata list. Distances are squared Euclidean.

pub mod distance;
mod hnsw;

pub use hnsw::{HnswIndex, HnswParams};

use crate::errors::Result;
use std::path::Path;

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Opaque ANN capability: build, add, search, save, load
pub trait VectorIndex: Send + Sync {
    /// Build an index over `vectors`, positions following slice order
    fn build(vectors: &[Vec<f32>], params: &HnswParams) -> Result<Self>
    where
        Self: Sized;

    /// Append one vector, returning its position
    fn add(&mut self, vector: &[f32]) -> Result<usize>;

    /// Up to `k` nearest neighbors, ascending by distance
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, known once the first vector is added
    fn dimension(&self) -> Option<usize>;
}
