//! Clustering-guided oversampling with a bounded retry budget and a plain
//! SMOTE fallback.

use crate::error::{Result, VoxkanError};
use crate::synthetic::{target_counts, KMeansSmote, ResampleResult, Sampler, Smote};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Which generator produced a resampled set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleStrategy {
    /// KMeans-SMOTE succeeded on the given zero-based attempt
    ClusterGuided { attempt: usize, n_clusters: usize },
    /// Every clustering attempt failed; plain SMOTE was used
    Interpolation,
}

/// Oversampler used before each fold's model training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSmote {
    seed: u64,
    max_attempts: usize,
    n_clusters: usize,
    k_neighbors: usize,
    fallback_k_neighbors: usize,
    sampling_strategy: f64,
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl CustomSmote {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_attempts: 10,
            n_clusters: 8,
            k_neighbors: 2,
            fallback_k_neighbors: 5,
            sampling_strategy: 1.0,
            target_counts: None,
        }
    }

    /// Number of clustering attempts before falling back
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Cluster count used on the first attempt; each retry uses one fewer
    pub fn with_n_clusters(mut self, n_clusters: usize) -> Self {
        self.n_clusters = n_clusters.max(1);
        self
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_fallback_k_neighbors(mut self, k: usize) -> Self {
        self.fallback_k_neighbors = k.max(1);
        self
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio.clamp(0.1, 10.0);
        self
    }

    /// Resample towards the fitted per-class targets and report which
    /// generator produced the output
    pub fn resample_with_strategy(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
    ) -> Result<(ResampleResult, ResampleStrategy)> {
        let targets = self
            .target_counts
            .as_ref()
            .ok_or(VoxkanError::ModelNotFitted)?;

        for attempt in 0..self.max_attempts {
            let n_clusters = self.n_clusters.saturating_sub(attempt).max(1);
            let sampler = KMeansSmote::new()
                .with_n_clusters(n_clusters)
                .with_k_neighbors(self.k_neighbors)
                .with_seed(self.seed.wrapping_add(attempt as u64))
                .with_targets(targets.clone());

            match sampler.resample(x, y) {
                Ok(result) => {
                    debug!(attempt, n_clusters, "Clustering-guided oversampling succeeded");
                    return Ok((result, ResampleStrategy::ClusterGuided { attempt, n_clusters }));
                }
                Err(e) if e.is_recoverable() => {
                    debug!(attempt, n_clusters, error = %e, "Clustering attempt failed");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            attempts = self.max_attempts,
            "Clustering-guided oversampling failed, falling back to SMOTE"
        );
        let fallback = Smote::new()
            .with_k_neighbors(self.fallback_k_neighbors)
            .with_seed(self.seed)
            .with_targets(targets.clone());
        let result = fallback.resample(x, y)?;
        Ok((result, ResampleStrategy::Interpolation))
    }
}

impl Default for CustomSmote {
    fn default() -> Self {
        Self::new(42)
    }
}

impl Sampler for CustomSmote {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.target_counts = Some(target_counts(x, y, self.sampling_strategy)?);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        self.resample_with_strategy(x, y).map(|(result, _)| result)
    }
}
