//! Cross-validated sweep execution

use super::grid::{arch_label, candidate_architectures, SearchSpace};
use super::job::{fold_file_name, JobSpec};
use super::ledger::{remove_fold_files, JobLedger};
use crate::dataset::{discover_datasets, Dataset};
use crate::error::{Result, VoxkanError};
use crate::kan::{KanNetwork, RegMetric};
use crate::preprocessing::Scaler;
use crate::synthetic::{CustomSmote, Sampler};
use crate::training::{
    CrossValidator, FoldData, FoldHistory, FoldSummary, KanTrainer, OptimizerConfig,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Best parameter-search configuration of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestArch {
    pub dataset: String,
    pub arch: Vec<usize>,
    pub grid: usize,
    pub k: usize,
    pub entropy: f64,
    pub smoothing: f64,
    pub reg: RegMetric,
}

/// Learning-rate sweep over the best architecture of each dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LrSearchConfig {
    pub best: Vec<BestArch>,
    pub learning_rates: Vec<f64>,
    pub steps: usize,
}

impl Default for LrSearchConfig {
    fn default() -> Self {
        Self {
            best: vec![
                BestArch {
                    dataset: "men".to_string(),
                    arch: vec![21, 42, 26, 2],
                    grid: 6,
                    k: 4,
                    entropy: 0.01,
                    smoothing: 0.0,
                    reg: RegMetric::EdgeForwardSplineN,
                },
                BestArch {
                    dataset: "women".to_string(),
                    arch: vec![21, 34, 26, 2],
                    grid: 7,
                    k: 5,
                    entropy: 1.0,
                    smoothing: 0.0,
                    reg: RegMetric::EdgeForwardSplineU,
                },
            ],
            learning_rates: vec![0.01, 0.05, 0.001, 0.005, 1e-4, 5e-4, 1e-5, 5e-5, 1e-6, 5e-6],
            steps: 200,
        }
    }
}

impl LrSearchConfig {
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        let mut jobs = Vec::with_capacity(self.best.len() * self.learning_rates.len());
        for best in &self.best {
            for &lr in &self.learning_rates {
                jobs.push(JobSpec {
                    dataset: best.dataset.clone(),
                    arch: best.arch.clone(),
                    grid: best.grid,
                    k: best.k,
                    entropy: best.entropy,
                    smoothing: best.smoothing,
                    reg: best.reg,
                    optimizer: OptimizerConfig::adam(lr),
                    steps: self.steps,
                });
            }
        }
        jobs
    }
}

/// What `run_job` did with a job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobOutcome {
    Skipped,
    Completed { mean_best_test_uar: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub completed: usize,
    pub skipped: usize,
}

impl SweepStats {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Completed { .. } => self.completed += 1,
        }
    }
}

/// Runs jobs fold by fold and records finished jobs in the ledger
pub struct SweepRunner {
    results_root: PathBuf,
    n_splits: usize,
    seed: u64,
    lamb: f64,
    ledger: JobLedger,
}

impl SweepRunner {
    pub fn new<P: AsRef<Path>>(results_root: P) -> Result<Self> {
        let results_root = results_root.as_ref().to_path_buf();
        let ledger = JobLedger::open(&results_root)?;
        Ok(Self {
            results_root,
            n_splits: 10,
            seed: 42,
            lamb: 0.001,
            ledger,
        })
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_lamb(mut self, lamb: f64) -> Self {
        self.lamb = lamb;
        self
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// L-BFGS sweep over `space` × every dataset under `data_root` × the
    /// candidate architectures of each dataset
    pub fn run_param_search<P: AsRef<Path>>(
        &mut self,
        data_root: P,
        space: &SearchSpace,
        steps: usize,
    ) -> Result<SweepStats> {
        let datasets = load_all(data_root.as_ref())?;
        info!(
            points = space.len(),
            datasets = datasets.len(),
            "starting parameter search"
        );

        let mut stats = SweepStats::default();
        for point in space.points() {
            for (name, dataset) in &datasets {
                for arch in candidate_architectures(dataset.n_features()) {
                    let job =
                        JobSpec::from_point(&point, name, arch, OptimizerConfig::lbfgs(), steps);
                    stats.record(self.run_job(&job, dataset)?);
                }
            }
        }

        info!(completed = stats.completed, skipped = stats.skipped, "parameter search finished");
        Ok(stats)
    }

    /// Adam sweep over learning rates for each dataset's best architecture
    pub fn run_lr_search<P: AsRef<Path>>(
        &mut self,
        data_root: P,
        config: &LrSearchConfig,
    ) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        let mut loaded: Option<(String, Dataset)> = None;

        for job in config.jobs() {
            let cached = matches!(&loaded, Some((name, _)) if *name == job.dataset);
            if !cached {
                let dataset = Dataset::load(data_root.as_ref().join(&job.dataset))?;
                loaded = Some((job.dataset.clone(), dataset));
            }
            if let Some((_, dataset)) = &loaded {
                stats.record(self.run_job(&job, dataset)?);
            }
        }

        info!(
            completed = stats.completed,
            skipped = stats.skipped,
            "learning-rate search finished"
        );
        Ok(stats)
    }

    /// Cross-validate one job on `dataset`, writing one history file per
    /// fold. Jobs the ledger records with the same fold count, steps and
    /// seed are skipped.
    pub fn run_job(&mut self, job: &JobSpec, dataset: &Dataset) -> Result<JobOutcome> {
        if self.ledger.is_complete(job, &self.results_root, self.n_splits, self.seed)? {
            debug!(job = %job.key(), "already complete, skipping");
            return Ok(JobOutcome::Skipped);
        }
        if job.arch.first() != Some(&dataset.n_features()) {
            return Err(VoxkanError::ValidationError(format!(
                "architecture {} does not take {} input features",
                arch_label(&job.arch),
                dataset.n_features()
            )));
        }

        let result_dir = job.result_dir(&self.results_root);
        let stale = remove_fold_files(&result_dir)?;
        if stale > 0 {
            debug!(job = %job.key(), stale, "removed fold files of an earlier run");
        }
        fs::create_dir_all(&result_dir)?;
        info!(job = %job.key(), optimizer = %job.optimizer, "evaluating");

        let started = Instant::now();
        let x = dataset.features();
        let y = &dataset.y;
        let splits = CrossValidator::new(self.n_splits)
            .with_random_state(self.seed)
            .split(y)?;

        let fit_config = job.fit_config(self.lamb);
        let mut best_uars = Vec::with_capacity(splits.len());

        for split in &splits {
            let fold = self.prepare_fold(&x, y, &split.train_indices, &split.test_indices)?;
            debug!(
                fold = split.fold_idx + 1,
                train = fold.train_x.nrows(),
                test = fold.test_x.nrows(),
                "fold prepared"
            );

            let mut model = KanNetwork::new(job.kan_config(self.seed))?;
            let history = KanTrainer::fit(&mut model, &fold, &fit_config)?;

            if let Some(summary) = FoldSummary::from_history(&history) {
                info!(
                    fold = split.fold_idx + 1,
                    final_test_acc = summary.final_test_acc,
                    mean_test_acc = summary.mean_test_acc,
                    best_test_uar = summary.best_test_uar,
                    best_test_uar_step = summary.best_test_uar_step,
                    best_train_uar_step = summary.best_train_uar_step,
                    best_train_loss_step = summary.best_train_loss_step,
                    best_test_loss_step = summary.best_test_loss_step,
                    "fold finished"
                );
                best_uars.push(summary.best_test_uar);
            }

            write_history(&result_dir.join(fold_file_name(split.fold_idx)), &history)?;
        }

        self.ledger.mark_complete(job, splits.len(), self.seed)?;

        let mean_best_test_uar = if best_uars.is_empty() {
            0.0
        } else {
            best_uars.iter().sum::<f64>() / best_uars.len() as f64
        };
        info!(
            job = %job.key(),
            mean_best_test_uar,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "job finished"
        );
        Ok(JobOutcome::Completed { mean_best_test_uar })
    }

    /// Oversample the training rows, then scale both splits to [-1, 1]
    /// with the range of the resampled training set
    fn prepare_fold(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        train: &[usize],
        test: &[usize],
    ) -> Result<FoldData> {
        let train_x = x.select(Axis(0), train);
        let train_y = y.select(Axis(0), train);
        let test_x = x.select(Axis(0), test);
        let test_y = y.select(Axis(0), test);

        let resampled = CustomSmote::new(self.seed).fit_resample(&train_x, &train_y)?;

        let mut scaler = Scaler::min_max(-1.0, 1.0);
        let train_x = to_single_precision(scaler.fit_transform(&resampled.x)?);
        let test_x = to_single_precision(scaler.transform(&test_x)?);

        Ok(FoldData {
            train_x,
            train_y: resampled.y,
            test_x,
            test_y,
        })
    }
}

/// Round scaled features through `f32`, the precision datasets are stored in
fn to_single_precision(x: Array2<f64>) -> Array2<f64> {
    x.mapv(|v| f64::from(v as f32))
}

fn write_history(path: &Path, history: &FoldHistory) -> Result<()> {
    serde_json::to_writer(BufWriter::new(File::create(path)?), history)?;
    Ok(())
}

fn load_all(data_root: &Path) -> Result<Vec<(String, Dataset)>> {
    let found = discover_datasets(data_root)?;
    if found.is_empty() {
        return Err(VoxkanError::DataError(format!(
            "no datasets under {}",
            data_root.display()
        )));
    }
    found
        .into_iter()
        .map(|(name, dir)| Ok((name, Dataset::load(dir)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lr_jobs() {
        let jobs = LrSearchConfig::default().jobs();
        assert_eq!(jobs.len(), 20);
        assert_eq!(jobs[0].dataset, "men");
        assert_eq!(jobs[0].optimizer, OptimizerConfig::adam(0.01));
        assert_eq!(jobs[0].steps, 200);
        assert_eq!(jobs[10].dataset, "women");
        assert_eq!(jobs[10].reg, RegMetric::EdgeForwardSplineU);
        assert_eq!(
            jobs[6].key().as_str(),
            "g6_k4_entropy0.01_smoothing0.0_lr1e-05_reg/men/21_42_26_2"
        );
    }

    #[test]
    fn test_to_single_precision() {
        let x = ndarray::array![[0.1, -1.0]];
        let rounded = to_single_precision(x);
        assert_eq!(rounded[[0, 0]], f64::from(0.1f32));
        assert_eq!(rounded[[0, 1]], -1.0);
    }
}
