//! Clustering-guided SMOTE
//!
//! Rows are clustered with k-means first; synthetic minority samples are only
//! interpolated between minority members of the same cluster, and sparse
//! clusters receive proportionally more of them.

use crate::error::{Result, VoxkanError};
use crate::synthetic::smote::interpolate_pool;
use crate::synthetic::{
    check_finite, class_counts, stack_result, target_counts, ResampleResult, Sampler,
};
use crate::training::clustering::KMeans;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A cluster eligible for synthesis, with the minority rows it holds
#[derive(Debug, Clone)]
struct ViableCluster {
    members: Vec<usize>,
    sparsity: f64,
}

/// KMeans-SMOTE sampler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansSmote {
    k_neighbors: usize,
    n_clusters: usize,
    /// Minimum share of the oversampled class inside a cluster.
    /// `None` uses that class's share of the whole training set.
    cluster_balance_threshold: Option<f64>,
    /// Exponent applied to the mean intra-cluster distance.
    /// `None` uses `log_1.6(n_features)`.
    density_exponent: Option<f64>,
    sampling_strategy: f64,
    seed: Option<u64>,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl KMeansSmote {
    pub fn new() -> Self {
        Self {
            k_neighbors: 2,
            n_clusters: 8,
            cluster_balance_threshold: None,
            density_exponent: None,
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters.max(1);
        self
    }

    pub fn with_cluster_balance_threshold(mut self, threshold: f64) -> Self {
        self.cluster_balance_threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    pub fn with_density_exponent(mut self, exponent: f64) -> Self {
        self.density_exponent = Some(exponent);
        self
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio.clamp(0.1, 10.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Use per-class targets computed elsewhere instead of fitting
    pub(crate) fn with_targets(mut self, targets: BTreeMap<i64, usize>) -> Self {
        self.target_counts = Some(targets);
        self
    }

    fn mean_pairwise_distance(x: &Array2<f64>, rows: &[usize]) -> f64 {
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (a, &i) in rows.iter().enumerate() {
            for &j in &rows[a + 1..] {
                total += x
                    .row(i)
                    .iter()
                    .zip(x.row(j).iter())
                    .map(|(p, q)| (p - q).powi(2))
                    .sum::<f64>()
                    .sqrt();
                pairs += 1;
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f64
        }
    }

    /// Clusters where `class` is frequent enough and spread out enough to
    /// interpolate inside
    fn viable_clusters(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        labels: &Array1<usize>,
        class: i64,
        n_clusters: usize,
    ) -> Vec<ViableCluster> {
        let class_share = class_counts(y).get(&class).copied().unwrap_or(0) as f64 / y.len() as f64;
        let threshold = self.cluster_balance_threshold.unwrap_or(class_share);
        let exponent = self
            .density_exponent
            .unwrap_or_else(|| (x.ncols() as f64).ln() / 1.6f64.ln());

        let mut sizes = vec![0usize; n_clusters];
        let mut minority: Vec<Vec<usize>> = vec![Vec::new(); n_clusters];
        for (i, &c) in labels.iter().enumerate() {
            sizes[c] += 1;
            if y[i] == class {
                minority[c].push(i);
            }
        }

        minority
            .into_iter()
            .enumerate()
            .filter_map(|(c, members)| {
                if members.len() < 2 {
                    return None;
                }
                let share = members.len() as f64 / sizes[c] as f64;
                if share < threshold {
                    return None;
                }
                let mean_distance = Self::mean_pairwise_distance(x, &members);
                if mean_distance <= 0.0 || !mean_distance.is_finite() {
                    return None;
                }
                let sparsity = mean_distance.powf(exponent) / members.len() as f64;
                if !sparsity.is_finite() || sparsity <= 0.0 {
                    return None;
                }
                Some(ViableCluster { members, sparsity })
            })
            .collect()
    }

    /// Split `total` across clusters by sparsity weight, handing out the
    /// rounding remainder by largest fractional part
    fn allocate(clusters: &[ViableCluster], total: usize) -> Vec<usize> {
        let sum: f64 = clusters.iter().map(|c| c.sparsity).sum();
        let shares: Vec<f64> = clusters
            .iter()
            .map(|c| c.sparsity / sum * total as f64)
            .collect();
        let mut counts: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();

        let assigned: usize = counts.iter().sum();
        let mut order: Vec<usize> = (0..clusters.len()).collect();
        order.sort_by(|&a, &b| {
            let fa = shares[a] - shares[a].floor();
            let fb = shares[b] - shares[b].floor();
            fb.partial_cmp(&fa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        for &i in order.iter().cycle().take(total.saturating_sub(assigned)) {
            counts[i] += 1;
        }
        counts
    }
}

impl Default for KMeansSmote {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for KMeansSmote {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.target_counts = Some(target_counts(x, y, self.sampling_strategy)?);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or(VoxkanError::ModelNotFitted)?;

        let seed = self.seed.unwrap_or(0);
        let counts = class_counts(y);

        for (class, &target) in targets {
            if target > counts.get(class).copied().unwrap_or(0) {
                let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == *class).collect();
                check_finite(x, &rows)?;
            }
        }

        let n_clusters = self.n_clusters.min(x.nrows());
        let mut kmeans = KMeans::new(n_clusters).with_random_state(seed);
        kmeans.fit(x)?;
        let labels = kmeans
            .labels
            .clone()
            .ok_or(VoxkanError::ModelNotFitted)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut synthetic_x: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        for (&class, &target_count) in targets {
            let current_count = counts.get(&class).copied().unwrap_or(0);
            let n_to_generate = target_count.saturating_sub(current_count);
            n_synthetic.insert(class, n_to_generate);
            if n_to_generate == 0 {
                continue;
            }

            let clusters = self.viable_clusters(x, y, &labels, class, n_clusters);
            if clusters.is_empty() {
                return Err(VoxkanError::OversamplingError(format!(
                    "no cluster out of {} holds enough spread-out samples of class {}",
                    n_clusters, class
                )));
            }
            debug!(class, n_clusters, viable = clusters.len(), "Selected clusters for synthesis");

            for (cluster, n) in clusters.iter().zip(Self::allocate(&clusters, n_to_generate)) {
                if n == 0 {
                    continue;
                }
                let pool: Vec<Vec<f64>> =
                    cluster.members.iter().map(|&i| x.row(i).to_vec()).collect();
                let generated = interpolate_pool(&pool, n, self.k_neighbors, &mut rng)?;
                synthetic_y.extend(std::iter::repeat(class).take(generated.len()));
                synthetic_x.extend(generated);
            }
        }

        Ok(stack_result(x, y, synthetic_x, synthetic_y, n_synthetic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two separated majority blobs, minority scattered inside the second
    fn clustered_data() -> (Array2<f64>, Array1<i64>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            data.push((i % 4) as f64 * 0.2);
            data.push((i / 4) as f64 * 0.2);
            labels.push(0);
        }
        for i in 0..10 {
            data.push(20.0 + (i % 4) as f64 * 0.3);
            data.push(20.0 + (i / 4) as f64 * 0.3);
            labels.push(0);
        }
        for i in 0..8 {
            data.push(20.1 + (i % 3) as f64 * 0.25);
            data.push(20.1 + (i / 3) as f64 * 0.25);
            labels.push(1);
        }
        (
            Array2::from_shape_vec((38, 2), data).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_kmeans_smote_balances_exactly() {
        let (x, y) = clustered_data();
        let mut sampler = KMeansSmote::new().with_n_clusters(2).with_seed(42);
        let result = sampler.fit_resample(&x, &y).unwrap();
        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 30);
        assert_eq!(counts[&1], 30);
    }

    #[test]
    fn test_synthetic_rows_stay_in_minority_cluster() {
        let (x, y) = clustered_data();
        let mut sampler = KMeansSmote::new().with_n_clusters(2).with_seed(42);
        let result = sampler.fit_resample(&x, &y).unwrap();
        for row in result.x.rows().into_iter().skip(x.nrows()) {
            assert!(row[0] >= 20.1 - 1e-12 && row[0] <= 20.6 + 1e-12);
            assert!(row[1] >= 20.1 - 1e-12 && row[1] <= 20.6 + 1e-12);
        }
    }

    #[test]
    fn test_identical_minority_has_no_viable_cluster() {
        let mut data = Vec::new();
        for i in 0..10 {
            data.push(i as f64);
        }
        data.extend([3.0, 3.0, 3.0]);
        let x = Array2::from_shape_vec((13, 1), data).unwrap();
        let y = Array1::from_vec([vec![0; 10], vec![1; 3]].concat());

        let mut sampler = KMeansSmote::new().with_n_clusters(3).with_seed(1);
        let err = sampler.fit_resample(&x, &y).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_allocate_sums_to_total() {
        let clusters = vec![
            ViableCluster { members: vec![0, 1], sparsity: 1.0 },
            ViableCluster { members: vec![2, 3], sparsity: 1.0 },
            ViableCluster { members: vec![4, 5], sparsity: 1.0 },
        ];
        let counts = KMeansSmote::allocate(&clusters, 10);
        assert_eq!(counts.iter().sum::<usize>(), 10);
        assert_eq!(counts, vec![4, 3, 3]);
    }
}
