//! Curriculum controller: per-design cell sets, EMA scores and expansion.

use super::{kmeans, Cell, DesignSet};
use crate::{GaitError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Offsets probed around a cell whose score crosses the threshold.
const EXPANSION_OFFSETS: [(i32, i32); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

/// Settings for building the curriculum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Number of k-means design clusters
    pub num_designs: usize,
    /// EMA weight of a new episode score
    pub alpha: f64,
    /// k-means iteration budget
    pub kmeans_iters: usize,
    /// Seed for k-means initialization
    pub seed: u64,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            num_designs: 10,
            alpha: 0.2,
            kmeans_iters: 10,
            seed: 0,
        }
    }
}

/// Explored cells of one design with their scores and episode counts.
///
/// The three sequences are index-aligned and only ever grow together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignTrack {
    cells: Vec<Cell>,
    scores: Vec<f64>,
    counts: Vec<u64>,
}

impl DesignTrack {
    fn new() -> Self {
        Self {
            cells: vec![Cell::ORIGIN],
            scores: vec![0.0],
            counts: vec![0],
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
        self.scores.push(0.0);
        self.counts.push(0);
    }
}

/// What a single `record` call changed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordOutcome {
    /// Updated EMA score of the recorded cell
    pub score: f64,
    /// Number of cells appended by frontier expansion
    pub added: usize,
}

/// Aggregate numbers for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CurriculumStats {
    /// Total number of cells across designs
    pub area: usize,
    /// Mean number of episodes per cell
    pub count_per_cell: f64,
    pub count_max: u64,
    pub count_min: u64,
}

/// Curriculum over designs and difficulty cells.
#[derive(Clone, Debug)]
pub struct Curriculum {
    designs: DesignSet,
    tracks: Vec<DesignTrack>,
    alpha: f64,
    score_th: f64,
}

impl Curriculum {
    /// Cluster leg configurations into designs and start every design at `(0, 0)`.
    ///
    /// Leg parameters are scaled into `[0, 1]` with `(p - low) / (high - low)`
    /// before clustering.
    pub fn initialize(
        leg_params: ArrayView2<f32>,
        low: ArrayView1<f32>,
        high: ArrayView1<f32>,
        score_th: f64,
        config: &CurriculumConfig,
    ) -> Result<Self> {
        let dim = leg_params.ncols();
        if low.len() != dim || high.len() != dim {
            return Err(GaitError::ShapeMismatch {
                expected: vec![dim],
                actual: vec![low.len(), high.len()],
            });
        }
        if low.iter().zip(high.iter()).any(|(l, h)| h <= l) {
            return Err(GaitError::InvalidConfig(
                "leg parameter bounds must satisfy low < high".into(),
            ));
        }

        let range = &high - &low;
        let normalized: Array2<f32> = (&leg_params - &low) / &range;
        let clusters = kmeans(
            normalized.view(),
            config.num_designs,
            config.kmeans_iters,
            config.seed,
        )?;

        tracing::info!(
            designs = config.num_designs,
            leg_configs = leg_params.nrows(),
            "Clustered leg configurations into designs"
        );

        let designs = DesignSet {
            centroids: clusters.centroids,
            labels: clusters.labels,
        };
        let tracks = (0..config.num_designs).map(|_| DesignTrack::new()).collect();

        Ok(Self {
            designs,
            tracks,
            alpha: config.alpha,
            score_th,
        })
    }

    /// Rebuild a curriculum from checkpointed arrays.
    pub fn from_parts(
        designs: DesignSet,
        cells: Vec<Vec<Cell>>,
        scores: Vec<Vec<f64>>,
        counts: Vec<Vec<u64>>,
        alpha: f64,
        score_th: f64,
    ) -> Result<Self> {
        let k = designs.len();
        if cells.len() != k || scores.len() != k || counts.len() != k {
            return Err(GaitError::Checkpoint(format!(
                "curriculum has {} designs but {} cell sets, {} score sets, {} count sets",
                k,
                cells.len(),
                scores.len(),
                counts.len()
            )));
        }

        let mut tracks = Vec::with_capacity(k);
        for (design, ((cells, scores), counts)) in
            cells.into_iter().zip(scores).zip(counts).enumerate()
        {
            if cells.len() != scores.len() || cells.len() != counts.len() {
                return Err(GaitError::Checkpoint(format!(
                    "design {} has {} cells, {} scores and {} counts",
                    design,
                    cells.len(),
                    scores.len(),
                    counts.len()
                )));
            }
            tracks.push(DesignTrack {
                cells,
                scores,
                counts,
            });
        }

        Ok(Self {
            designs,
            tracks,
            alpha,
            score_th,
        })
    }

    /// Fold one finished episode into the curriculum.
    ///
    /// # Panics
    /// If `design` is out of range or `cell` is not part of the design's set.
    pub fn record(&mut self, design: usize, cell: Cell, raw_score: f64) -> RecordOutcome {
        let track = &mut self.tracks[design];
        let idx = track
            .cells
            .iter()
            .position(|c| *c == cell)
            .unwrap_or_else(|| panic!("cell {} is not part of design {}", cell, design));

        let score = (1.0 - self.alpha) * track.scores[idx] + self.alpha * raw_score;
        track.scores[idx] = score;
        track.counts[idx] += 1;

        let added = if score > self.score_th {
            Self::expand(track, cell)
        } else {
            0
        };

        RecordOutcome { score, added }
    }

    fn expand(track: &mut DesignTrack, cell: Cell) -> usize {
        let mut present: HashSet<Cell> = track.cells.iter().copied().collect();
        let before = track.len();

        for (dx, dy) in EXPANSION_OFFSETS {
            let nx = cell.x + dx;
            let ny = cell.y + dy;
            for candidate in [
                Cell::new(nx, ny),
                Cell::new(-nx, ny),
                Cell::new(nx, -ny),
                Cell::new(-nx, -ny),
            ] {
                if present.insert(candidate) {
                    track.push(candidate);
                }
            }
        }

        track.len() - before
    }

    pub fn designs(&self) -> &DesignSet {
        &self.designs
    }

    pub fn tracks(&self) -> &[DesignTrack] {
        &self.tracks
    }

    pub fn num_designs(&self) -> usize {
        self.tracks.len()
    }

    pub fn score_th(&self) -> f64 {
        self.score_th
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Snapshot of every design's cell set, in design order.
    pub fn cells(&self) -> Vec<Vec<Cell>> {
        self.tracks.iter().map(|t| t.cells.clone()).collect()
    }

    pub fn scores(&self) -> Vec<Vec<f64>> {
        self.tracks.iter().map(|t| t.scores.clone()).collect()
    }

    pub fn counts(&self) -> Vec<Vec<u64>> {
        self.tracks.iter().map(|t| t.counts.clone()).collect()
    }

    pub fn stats(&self) -> CurriculumStats {
        let area: usize = self.tracks.iter().map(|t| t.len()).sum();
        let all_counts = self.tracks.iter().flat_map(|t| t.counts.iter().copied());
        let total: u64 = all_counts.clone().sum();

        CurriculumStats {
            area,
            count_per_cell: if area > 0 { total as f64 / area as f64 } else { 0.0 },
            count_max: all_counts.clone().max().unwrap_or(0),
            count_min: all_counts.min().unwrap_or(0),
        }
    }
}
