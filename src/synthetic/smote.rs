//! Plain SMOTE

use crate::error::{Result, VoxkanError};
use crate::synthetic::{
    check_finite, class_counts, class_indices, stack_result, target_counts, ResampleResult,
    Sampler,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// Distance/index pair ordered by distance, ties broken by index
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(ai, bi)| (ai - bi).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Indices of the `k` nearest members of `pool` to `pool[idx]`, excluding
/// `idx` itself. Duplicated points are valid neighbours.
fn find_neighbors(pool: &[Vec<f64>], idx: usize, k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
    let point = &pool[idx];

    for (i, other) in pool.iter().enumerate() {
        if i == idx {
            continue;
        }
        let candidate = DistIdx(distance(point, other), i);
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
}

/// Generate `n_to_generate` convex interpolations between members of `pool`
/// and one of their `k` nearest neighbours in `pool`.
pub(crate) fn interpolate_pool(
    pool: &[Vec<f64>],
    n_to_generate: usize,
    k: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Vec<f64>>> {
    if pool.len() < 2 {
        return Err(VoxkanError::ValidationError(format!(
            "interpolation needs at least 2 samples, got {}",
            pool.len()
        )));
    }

    let k = k.clamp(1, pool.len() - 1);
    let neighbors: Vec<Vec<usize>> = (0..pool.len())
        .map(|i| find_neighbors(pool, i, k))
        .collect();

    let mut synthetic = Vec::with_capacity(n_to_generate);
    for _ in 0..n_to_generate {
        let idx = rng.gen_range(0..pool.len());
        let candidates = &neighbors[idx];
        let neighbor = &pool[candidates[rng.gen_range(0..candidates.len())]];
        let gap: f64 = rng.gen();

        synthetic.push(
            pool[idx]
                .iter()
                .zip(neighbor.iter())
                .map(|(&p, &n)| p + gap * (n - p))
                .collect(),
        );
    }

    Ok(synthetic)
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Sampling strategy (ratio of minority to majority)
    sampling_strategy: f64,
    /// Random seed
    seed: Option<u64>,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl Smote {
    /// Create new SMOTE sampler
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set sampling strategy (ratio)
    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio.clamp(0.1, 10.0);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use per-class targets computed elsewhere instead of fitting
    pub(crate) fn with_targets(mut self, targets: BTreeMap<i64, usize>) -> Self {
        self.target_counts = Some(targets);
        self
    }
}

impl Default for Smote {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for Smote {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.target_counts = Some(target_counts(x, y, self.sampling_strategy)?);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or(VoxkanError::ModelNotFitted)?;

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices = class_indices(y);
        let counts = class_counts(y);

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

            let class_idx = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            check_finite(x, class_idx)?;
            let pool: Vec<Vec<f64>> = class_idx.iter().map(|&i| x.row(i).to_vec()).collect();

            let generated = interpolate_pool(&pool, n_to_generate, self.k_neighbors, &mut rng)?;
            synthetic_y.extend(std::iter::repeat(class).take(generated.len()));
            synthetic_x.extend(generated);
        }

        Ok(stack_result(x, y, synthetic_x, synthetic_y, n_synthetic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        // 20 majority, 5 minority
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0i64);
        }

        for i in 0..5 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1i64);
        }

        let x = Array2::from_shape_vec((25, 2), data).unwrap();
        let y = Array1::from_vec(labels);

        (x, y)
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();
        let mut smote = Smote::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic[&1], 15);
        assert_eq!(result.n_synthetic[&0], 0);
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();
        let mut smote = Smote::new().with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_smote_sampling_strategy() {
        let (x, y) = create_imbalanced_data();
        let mut smote = Smote::new().with_sampling_strategy(0.5).with_seed(1);
        let result = smote.fit_resample(&x, &y).unwrap();
        assert_eq!(class_counts(&result.y)[&1], 10);
    }

    #[test]
    fn test_smote_identical_minority_points() {
        let x = Array2::from_shape_vec(
            (6, 2),
            vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 5.0, 5.0, 5.0, 5.0],
        )
        .unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 0, 1, 1]);

        let mut smote = Smote::new().with_seed(3);
        let result = smote.fit_resample(&x, &y).unwrap();
        for row in result.x.rows().into_iter().skip(6) {
            assert_eq!(row.to_vec(), vec![5.0, 5.0]);
        }
    }

    #[test]
    fn test_smote_rejects_non_finite_minority() {
        let x = Array2::from_shape_vec(
            (5, 1),
            vec![0.0, 1.0, 2.0, f64::NAN, 4.0],
        )
        .unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 1, 1]);
        let mut smote = Smote::new().with_seed(3);
        assert!(smote.fit_resample(&x, &y).is_err());
    }

    #[test]
    fn test_resample_before_fit() {
        let (x, y) = create_imbalanced_data();
        let smote = Smote::new();
        assert!(matches!(smote.resample(&x, &y), Err(VoxkanError::ModelNotFitted)));
    }

    #[test]
    fn test_find_neighbors_sorted_and_excludes_self() {
        let pool = vec![vec![0.0], vec![1.0], vec![3.0], vec![0.5]];
        assert_eq!(find_neighbors(&pool, 0, 2), vec![3, 1]);
    }
}
