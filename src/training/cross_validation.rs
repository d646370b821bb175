//! Cross-validation splitting

use crate::error::{Result, VoxkanError};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter: rows are shuffled within each class, then
/// dealt to folds so each fold keeps the class proportions of the full set
pub struct CrossValidator {
    n_splits: usize,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits over the rows labelled by `y`
    pub fn split(&self, y: &Array1<i64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(VoxkanError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if y.len() < n_splits {
            return Err(VoxkanError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                y.len(),
                n_splits
            )));
        }

        Ok(self.stratified_k_fold_split(y, n_splits))
    }

    fn stratified_k_fold_split(&self, y: &Array1<i64>, n_splits: usize) -> Vec<CVSplit> {
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in y.iter().enumerate() {
            class_indices.entry(label).or_default().push(idx);
        }

        for (class, indices) in &class_indices {
            if indices.len() < n_splits {
                warn!(
                    class,
                    members = indices.len(),
                    n_splits,
                    "Least populated class has fewer members than folds"
                );
            }
        }

        let mut rng = self.rng();
        for indices in class_indices.values_mut() {
            indices.shuffle(&mut rng);
        }

        // Deal round-robin, carrying the fold cursor across classes so fold
        // sizes differ by at most one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut cursor = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[cursor % n_splits].push(idx);
                cursor += 1;
            }
        }

        for fold in &mut folds {
            fold.sort_unstable();
        }

        Self::splits_from_folds(folds)
    }

    fn splits_from_folds(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
        (0..folds.len())
            .map(|fold_idx| CVSplit {
                test_indices: folds[fold_idx].clone(),
                train_indices: {
                    let mut train: Vec<usize> = folds
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != fold_idx)
                        .flat_map(|(_, f)| f.iter().copied())
                        .collect();
                    train.sort_unstable();
                    train
                },
                fold_idx,
            })
            .collect()
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self { scores, mean_score: 0.0, std_score: 0.0, n_folds };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance =
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_k_fold_balances_classes() {
        let y = Array1::from_vec([vec![0i64; 30], vec![1i64; 12]].concat());
        let cv = CrossValidator::new(10).with_random_state(42);
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 10);
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..42).collect::<Vec<_>>());

        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert!((1..=2).contains(&positives));
            let size = split.test_indices.len();
            assert!(size == 4 || size == 5);
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
        }
    }

    #[test]
    fn test_stratified_is_deterministic() {
        let y = Array1::from_vec((0..40).map(|i| (i % 3 == 0) as i64).collect());
        let a = CrossValidator::new(4).with_random_state(7).split(&y).unwrap();
        let b = CrossValidator::new(4).with_random_state(7).split(&y).unwrap();
        for (sa, sb) in a.iter().zip(b.iter()) {
            assert_eq!(sa.test_indices, sb.test_indices);
        }
    }

    #[test]
    fn test_too_few_samples() {
        let y = Array1::from_vec(vec![0, 1, 1]);
        assert!(CrossValidator::new(5).split(&y).is_err());
        assert!(CrossValidator::new(1).split(&y).is_err());
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.5, 0.7]);
        assert!((results.mean_score - 0.6).abs() < 1e-12);
        assert!((results.std_score - 0.1).abs() < 1e-12);
    }
}
