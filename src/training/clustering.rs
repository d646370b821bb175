//! K-Means clustering
//!
//! Used by the clustering-guided oversampler to group training rows before
//! synthesising minority samples inside dense clusters.

use crate::error::{Result, VoxkanError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// K-Means clustering with k-means++ initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub random_state: u64,
    /// Cluster labels assigned during fit
    pub labels: Option<Array1<usize>>,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(8)
    }
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters: n_clusters.max(1),
            max_iter: 300,
            tol: 1e-4,
            random_state: 42,
            labels: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// K-means++ initialization: pick centroids spread apart
    fn kmeans_pp_init(x: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let n_samples = x.nrows();
        let mut centroids = Array2::zeros((k, x.ncols()));

        let first = (rng.next_u64() as usize) % n_samples;
        centroids.row_mut(0).assign(&x.row(first));

        for c in 1..k {
            let dists: Vec<f64> = (0..n_samples)
                .map(|i| {
                    (0..c)
                        .map(|j| Self::euclidean_sq(&x.row(i), &centroids.row(j)))
                        .fold(f64::MAX, f64::min)
                })
                .collect();

            // Weighted random selection proportional to D²
            let total: f64 = dists.iter().sum();
            if total <= 0.0 {
                let idx = (rng.next_u64() as usize) % n_samples;
                centroids.row_mut(c).assign(&x.row(idx));
                continue;
            }

            let r = (rng.next_u64() as f64 / u64::MAX as f64) * total;
            let mut cumulative = 0.0;
            let mut chosen = n_samples - 1;
            for (i, &d) in dists.iter().enumerate() {
                cumulative += d;
                if cumulative >= r {
                    chosen = i;
                    break;
                }
            }
            centroids.row_mut(c).assign(&x.row(chosen));
        }

        centroids
    }

    fn euclidean_sq(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }

    fn nearest(row: &ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
        let mut best_c = 0;
        let mut best_dist = f64::MAX;
        for (c, centroid) in centroids.rows().into_iter().enumerate() {
            let d = Self::euclidean_sq(row, &centroid);
            if d < best_dist {
                best_dist = d;
                best_c = c;
            }
        }
        best_c
    }

    /// Fit the model on the rows of `x`
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples < self.n_clusters {
            return Err(VoxkanError::ValidationError(format!(
                "n_samples ({}) < n_clusters ({})",
                n_samples, self.n_clusters
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut centroids = Self::kmeans_pp_init(x, self.n_clusters, &mut rng);
        let mut labels: Array1<usize> = Array1::from_elem(n_samples, usize::MAX);

        for _iter in 0..self.max_iter {
            // Assignment step
            let new_labels: Vec<usize> = (0..n_samples)
                .into_par_iter()
                .map(|i| Self::nearest(&x.row(i), &centroids))
                .collect();
            let new_labels = Array1::from_vec(new_labels);

            let changed = new_labels
                .iter()
                .zip(labels.iter())
                .filter(|(a, b)| a != b)
                .count();
            labels = new_labels;

            // Update step
            let mut new_centroids = Array2::zeros(centroids.dim());
            let mut counts = vec![0usize; self.n_clusters];
            for (i, &c) in labels.iter().enumerate() {
                counts[c] += 1;
                let mut centroid = new_centroids.row_mut(c);
                centroid += &x.row(i);
            }

            for c in 0..self.n_clusters {
                if counts[c] > 0 {
                    let mut centroid = new_centroids.row_mut(c);
                    centroid /= counts[c] as f64;
                } else {
                    // Empty cluster: reseed from a random row
                    let idx = (rng.next_u64() as usize) % n_samples;
                    new_centroids.row_mut(c).assign(&x.row(idx));
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();

            centroids = new_centroids;

            if changed == 0 || shift < self.tol {
                break;
            }
        }

        self.labels = Some(labels);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Array2<f64> {
        let mut data = Vec::new();
        for i in 0..10 {
            data.push((i % 3) as f64 * 0.1);
            data.push((i % 2) as f64 * 0.1);
        }
        for i in 0..10 {
            data.push(50.0 + (i % 3) as f64 * 0.1);
            data.push(50.0 + (i % 2) as f64 * 0.1);
        }
        Array2::from_shape_vec((20, 2), data).unwrap()
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let x = two_blobs();
        let mut km = KMeans::new(2).with_random_state(7);
        km.fit(&x).unwrap();

        let labels = km.labels.clone().unwrap();
        assert!(labels.iter().take(10).all(|&l| l == labels[0]));
        assert!(labels.iter().skip(10).all(|&l| l == labels[10]));
        assert_ne!(labels[0], labels[10]);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let x = two_blobs();
        let mut a = KMeans::new(3).with_random_state(11);
        let mut b = KMeans::new(3).with_random_state(11);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_kmeans_too_few_samples() {
        let x = Array2::zeros((2, 2));
        let mut km = KMeans::new(3);
        assert!(km.fit(&x).is_err());
    }

    #[test]
    fn test_one_cluster_per_distinct_row() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 5.0, 9.0]).unwrap();
        let mut km = KMeans::new(4).with_random_state(3);
        km.fit(&x).unwrap();

        let mut labels = km.labels.clone().unwrap().to_vec();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }
}
