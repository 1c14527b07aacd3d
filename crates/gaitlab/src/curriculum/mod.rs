//! Automatic curriculum over robot designs and difficulty cells.
//!
//! Provides:
//! - `Cell` - a discrete difficulty coordinate
//! - `DesignSet` - k-means design centroids and per-leg-configuration labels
//! - `Curriculum` - per-design cell sets with EMA scores and frontier expansion
//! - `heatmap` - grayscale rendering of scores and counts

mod controller;
pub mod heatmap;
mod kmeans;

pub use controller::{Curriculum, CurriculumConfig, CurriculumStats, DesignTrack, RecordOutcome};
pub use kmeans::{kmeans, KMeans};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A discrete 2-D coordinate in a design's difficulty grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const ORIGIN: Cell = Cell { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Clustered robot designs.
///
/// `centroids` holds one normalized leg-parameter vector per design and
/// `labels[i]` is the design that leg configuration `i` belongs to.
/// Immutable once computed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignSet {
    pub centroids: Array2<f32>,
    pub labels: Vec<usize>,
}

impl DesignSet {
    /// Number of designs (clusters).
    pub fn len(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.nrows() == 0
    }
}
