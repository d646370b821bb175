//! Sweep jobs and their result locations

use super::grid::{arch_label, format_float, GridPoint};
use crate::kan::{KanConfig, RegMetric};
use crate::training::{FitConfig, OptimizerConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identifier of a job, also its path below the results root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobKey {
    fn from(key: String) -> Self {
        JobKey(key)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cross-validated training configuration: a hyperparameter tuple
/// applied to one dataset with one architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub dataset: String,
    pub arch: Vec<usize>,
    pub grid: usize,
    pub k: usize,
    pub entropy: f64,
    pub smoothing: f64,
    pub reg: RegMetric,
    pub optimizer: OptimizerConfig,
    pub steps: usize,
}

impl JobSpec {
    pub fn from_point(
        point: &GridPoint,
        dataset: &str,
        arch: Vec<usize>,
        optimizer: OptimizerConfig,
        steps: usize,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            arch,
            grid: point.grid,
            k: point.k,
            entropy: point.entropy,
            smoothing: point.smoothing,
            reg: point.reg,
            optimizer,
            steps,
        }
    }

    /// Hyperparameter directory name.
    ///
    /// Parameter-search jobs (L-BFGS) name their regularizer:
    /// `g5_k3_entropy0.01_smoothing0.0_regedge_forward_sum`. Learning-rate
    /// jobs (Adam) name the rate instead: `g6_k4_entropy0.01_smoothing0.0_lr0.001_reg`.
    pub fn params_dir(&self) -> String {
        let prefix = format!(
            "g{}_k{}_entropy{}_smoothing{}",
            self.grid,
            self.k,
            format_float(self.entropy),
            format_float(self.smoothing)
        );
        match self.optimizer {
            OptimizerConfig::Adam { lr } => format!("{}_lr{}_reg", prefix, format_float(lr)),
            OptimizerConfig::Lbfgs { .. } => format!("{}_reg{}", prefix, self.reg),
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey(format!(
            "{}/{}/{}",
            self.params_dir(),
            self.dataset,
            arch_label(&self.arch)
        ))
    }

    /// Directory holding this job's fold files
    pub fn result_dir<P: AsRef<Path>>(&self, root: P) -> PathBuf {
        root.as_ref()
            .join(self.params_dir())
            .join(&self.dataset)
            .join(arch_label(&self.arch))
    }

    pub fn kan_config(&self, seed: u64) -> KanConfig {
        KanConfig::new(self.arch.clone())
            .with_grid(self.grid)
            .with_k(self.k)
            .with_seed(seed)
    }

    pub fn fit_config(&self, lamb: f64) -> FitConfig {
        FitConfig::default()
            .with_optimizer(self.optimizer)
            .with_steps(self.steps)
            .with_lamb(lamb)
            .with_lamb_entropy(self.entropy)
            .with_label_smoothing(self.smoothing)
            .with_reg_metric(self.reg)
    }
}

/// File name of fold `index` (0-based); files are numbered from 1
pub fn fold_file_name(index: usize) -> String {
    format!("kan_res_{}.json", index + 1)
}
