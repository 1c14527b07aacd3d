//! Seeded k-means used to cluster leg configurations into designs.

use crate::{GaitError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Result of a k-means run.
#[derive(Clone, Debug)]
pub struct KMeans {
    /// Cluster centroids [k, dim]
    pub centroids: Array2<f32>,
    /// Cluster index of every data row
    pub labels: Vec<usize>,
}

/// Cluster `data` rows into `k` groups.
///
/// Initial centroids are `k` distinct rows picked with a seeded RNG. Each of the
/// `iters` iterations assigns every row to its nearest centroid and then moves
/// each centroid to the mean of its members; a centroid without members keeps
/// its position. The returned labels are the assignment made in the last
/// iteration.
pub fn kmeans(data: ArrayView2<f32>, k: usize, iters: usize, seed: u64) -> Result<KMeans> {
    let n = data.nrows();
    if k == 0 {
        return Err(GaitError::InvalidConfig(
            "k-means needs at least one cluster".into(),
        ));
    }
    if k > n {
        return Err(GaitError::InvalidConfig(format!(
            "cannot form {} clusters from {} points",
            k, n
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let picks = rand::seq::index::sample(&mut rng, n, k);
    let mut centroids = data.select(Axis(0), &picks.into_vec());
    let mut labels = vec![0usize; n];

    for _ in 0..iters {
        for (row, label) in data.outer_iter().zip(labels.iter_mut()) {
            *label = nearest(row, centroids.view());
        }

        let mut sums = Array2::<f32>::zeros(centroids.raw_dim());
        let mut members = vec![0usize; k];
        for (row, &label) in data.outer_iter().zip(labels.iter()) {
            let mut sum = sums.row_mut(label);
            sum += &row;
            members[label] += 1;
        }

        for (c, &count) in members.iter().enumerate() {
            if count > 0 {
                let mean = &sums.row(c) / count as f32;
                centroids.row_mut(c).assign(&mean);
            }
        }
    }

    Ok(KMeans { centroids, labels })
}

fn nearest(point: ArrayView1<f32>, centroids: ArrayView2<f32>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.outer_iter().enumerate() {
        let dist: f32 = point
            .iter()
            .zip(c.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}
