//! End-to-end tests: compose datasets from a feature CSV, sweep KAN
//! configurations with cross-validation, resume from the ledger and rank
//! the results

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use voxkan::dataset::{compose_all, Dataset, DatasetConfig, Sex, CONFIG_FILE, MATRIX_FILE};
use voxkan::kan::RegMetric;
use voxkan::search::{
    candidate_architectures, BestArch, JobLedger, JobOutcome, JobSpec, LrSearchConfig,
    SearchSpace, SweepReport, SweepRunner, LEDGER_FILE,
};
use voxkan::training::OptimizerConfig;
use voxkan::VoxkanError;

/// 16 patients per sex, 6 of them pathological. Two feature families: a
/// scalar `stdev_f0` and a two-band `spectral_contrast` list.
fn write_features(dir: &Path) -> PathBuf {
    let mut csv = String::from("session_id,sex,pathology,stdev_f0,spectral_contrast\n");
    for sex in 0..2 {
        for i in 0..16 {
            let pathology = if i < 6 { 1 } else { 0 };
            let shift = if pathology == 1 { 3.0 } else { 0.0 };
            let f0 = shift + (i % 5) as f64 * 0.25 + sex as f64 * 0.1;
            let band_a = shift + (i % 3) as f64 * 0.4;
            let band_b = -shift + (i % 4) as f64 * 0.3;
            csv.push_str(&format!(
                "s{}_{},{},{},{},\"[{}, {}]\"\n",
                sex, i, sex, pathology, f0, band_a, band_b
            ));
        }
    }
    let path = dir.join("features.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn tiny_space() -> SearchSpace {
    SearchSpace::default()
        .with_regularizations(vec![RegMetric::EdgeForwardSplineN])
        .with_entropies(vec![0.01])
        .with_smoothings(vec![0.0])
        .with_ks(vec![2])
        .with_grids(vec![3])
}

fn fold_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("kan_res_"))
        .count()
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_compose_writes_matrix_and_config() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let out = tmp.path().join("training_data");

    let written = compose_all(&csv, &out, &DatasetConfig::defaults()).unwrap();
    assert_eq!(written, vec![out.join("men"), out.join("women")]);

    for dir in &written {
        assert!(dir.join(MATRIX_FILE).is_file());
        assert!(dir.join(CONFIG_FILE).is_file());
        let ds = Dataset::load(dir).unwrap();
        assert_eq!(ds.x.dim(), (16, 3));
        assert_eq!(ds.y.iter().filter(|&&l| l == 1).count(), 6);
    }

    let women = Dataset::load(out.join("women")).unwrap();
    assert_eq!(women.config.sex, Some(Sex::Women));
}

#[test]
fn test_compose_both_and_dropped_family() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let out = tmp.path().join("training_data");

    let mut config = DatasetConfig::for_sex(None);
    config.spectral_contrast = false;
    compose_all(&csv, &out, &[config]).unwrap();

    let both = Dataset::load(out.join("both")).unwrap();
    assert_eq!(both.x.dim(), (32, 1));
}

// ============================================================================
// Parameter search
// ============================================================================

#[test]
fn test_param_search_runs_then_resumes() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let data = tmp.path().join("training_data");
    compose_all(&csv, &data, &[DatasetConfig::for_sex(Some(Sex::Men))]).unwrap();
    let results = tmp.path().join("results");

    let archs = candidate_architectures(3);
    let unique: BTreeSet<Vec<usize>> = archs.iter().cloned().collect();

    let mut runner = SweepRunner::new(&results).unwrap().with_n_splits(2).with_seed(7);
    let stats = runner.run_param_search(&data, &tiny_space(), 1).unwrap();
    assert_eq!(stats.completed, unique.len());
    assert_eq!(stats.completed + stats.skipped, archs.len());
    assert_eq!(runner.ledger().len(), unique.len());
    assert!(results.join(LEDGER_FILE).is_file());

    let first = results.join("g3_k2_entropy0.01_smoothing0.0_regedge_forward_spline_n/men/3_6_2");
    assert_eq!(fold_files(&first), 2);

    // A fresh runner reads the ledger back and skips everything
    let mut resumed = SweepRunner::new(&results).unwrap().with_n_splits(2).with_seed(7);
    let stats = resumed.run_param_search(&data, &tiny_space(), 1).unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.skipped, archs.len());

    let report = SweepReport::scan(&results).unwrap();
    assert_eq!(report.len(), unique.len());
    let best = &report.top(1)[0];
    assert_eq!(best.best_test_uar.n_folds, 2);
    let worst = &report.entries()[report.len() - 1];
    assert!(best.best_test_uar.mean_score >= worst.best_test_uar.mean_score);
}

#[test]
fn test_fold_files_without_ledger_count_as_done() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let data = tmp.path().join("training_data");
    compose_all(&csv, &data, &[DatasetConfig::for_sex(Some(Sex::Men))]).unwrap();
    let dataset = Dataset::load(data.join("men")).unwrap();
    let results = tmp.path().join("results");

    let point = tiny_space().points()[0];
    let job = JobSpec::from_point(&point, "men", vec![3, 4, 2], OptimizerConfig::lbfgs(), 1);

    let mut runner = SweepRunner::new(&results).unwrap().with_n_splits(2);
    assert!(matches!(
        runner.run_job(&job, &dataset).unwrap(),
        JobOutcome::Completed { .. }
    ));
    fs::remove_file(results.join(LEDGER_FILE)).unwrap();

    let mut ledger = JobLedger::open(&results).unwrap();
    assert!(ledger.is_empty());
    assert!(ledger.is_complete(&job, &results, 2, 42).unwrap());
    assert_eq!(ledger.get(&job.key()).map(|e| e.folds), Some(2));
}

#[test]
fn test_more_folds_or_steps_rerun_a_finished_job() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let data = tmp.path().join("training_data");
    compose_all(&csv, &data, &[DatasetConfig::for_sex(Some(Sex::Men))]).unwrap();
    let dataset = Dataset::load(data.join("men")).unwrap();
    let results = tmp.path().join("results");

    let point = tiny_space().points()[0];
    let job = JobSpec::from_point(&point, "men", vec![3, 4, 2], OptimizerConfig::lbfgs(), 1);
    let result_dir = job.result_dir(&results);

    let mut two = SweepRunner::new(&results).unwrap().with_n_splits(2);
    assert!(matches!(two.run_job(&job, &dataset).unwrap(), JobOutcome::Completed { .. }));
    assert_eq!(two.run_job(&job, &dataset).unwrap(), JobOutcome::Skipped);

    let mut five = SweepRunner::new(&results).unwrap().with_n_splits(5);
    assert!(matches!(five.run_job(&job, &dataset).unwrap(), JobOutcome::Completed { .. }));
    assert_eq!(fold_files(&result_dir), 5);
    assert_eq!(five.ledger().get(&job.key()).map(|e| e.folds), Some(5));

    // A 5-fold record also satisfies a 2-fold request
    let mut back = SweepRunner::new(&results).unwrap().with_n_splits(2);
    assert_eq!(back.run_job(&job, &dataset).unwrap(), JobOutcome::Skipped);

    // Same key, longer training: stale histories are replaced
    let mut longer = job.clone();
    longer.steps = 2;
    let mut rerun = SweepRunner::new(&results).unwrap().with_n_splits(2);
    assert!(matches!(rerun.run_job(&longer, &dataset).unwrap(), JobOutcome::Completed { .. }));
    assert_eq!(fold_files(&result_dir), 2);
    assert_eq!(rerun.ledger().get(&job.key()).and_then(|e| e.steps), Some(2));
}

#[test]
fn test_architecture_must_match_features() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let data = tmp.path().join("training_data");
    compose_all(&csv, &data, &[DatasetConfig::for_sex(Some(Sex::Women))]).unwrap();
    let dataset = Dataset::load(data.join("women")).unwrap();

    let point = tiny_space().points()[0];
    let arch = vec![21, 42, 26, 2];
    let job = JobSpec::from_point(&point, "women", arch, OptimizerConfig::lbfgs(), 1);
    let mut runner = SweepRunner::new(tmp.path().join("results")).unwrap().with_n_splits(2);
    assert!(matches!(
        runner.run_job(&job, &dataset),
        Err(VoxkanError::ValidationError(_))
    ));
}

// ============================================================================
// Learning-rate search
// ============================================================================

#[test]
fn test_lr_search_writes_adam_paths() {
    let tmp = TempDir::new().unwrap();
    let csv = write_features(tmp.path());
    let data = tmp.path().join("training_data");
    compose_all(&csv, &data, &DatasetConfig::defaults()).unwrap();
    let results = tmp.path().join("results_adam");

    let config = LrSearchConfig {
        best: vec![BestArch {
            dataset: "women".to_string(),
            arch: vec![3, 4, 2],
            grid: 3,
            k: 2,
            entropy: 1.0,
            smoothing: 0.0,
            reg: RegMetric::EdgeForwardSplineU,
        }],
        learning_rates: vec![0.01, 1e-5],
        steps: 3,
    };

    let mut runner = SweepRunner::new(&results).unwrap().with_n_splits(2);
    let stats = runner.run_lr_search(&data, &config).unwrap();
    assert_eq!(stats.completed, 2);

    let fast = results.join("g3_k2_entropy1.0_smoothing0.0_lr0.01_reg/women/3_4_2");
    let slow = results.join("g3_k2_entropy1.0_smoothing0.0_lr1e-05_reg/women/3_4_2");
    assert_eq!(fold_files(&fast), 2);
    assert_eq!(fold_files(&slow), 2);

    let report = SweepReport::scan(&results).unwrap();
    assert_eq!(report.len(), 2);
    for entry in report.entries() {
        assert!((0.0..=1.0).contains(&entry.best_test_uar.mean_score));
        assert!((0.0..=1.0).contains(&entry.final_test_acc));
    }
}
