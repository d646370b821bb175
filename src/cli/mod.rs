//! voxkan command-line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::dataset::{compose_all, DatasetConfig, Sex};
use crate::search::{LrSearchConfig, SearchSpace, SweepReport, SweepRunner, SweepStats};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<14} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "voxkan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dataset assembly and cross-validated KAN search for voice pathology detection")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build per-sex training datasets from the feature CSV
    Compose {
        /// Per-patient feature table
        #[arg(long, default_value = "features.csv")]
        csv: PathBuf,

        /// Output root; one subdirectory per dataset
        #[arg(short, long, default_value = "training_data")]
        out: PathBuf,

        /// Datasets to build (men, women, both); defaults to men and women
        #[arg(long = "sex")]
        sexes: Vec<String>,
    },

    /// Cross-validated L-BFGS sweep over the parameter grid and architectures
    Search {
        /// Root holding composed datasets
        #[arg(short, long, default_value = "training_data")]
        data: PathBuf,

        /// Results root
        #[arg(short, long, default_value = "results_kan_params_5epochs")]
        out: PathBuf,

        /// JSON file overriding the default search space
        #[arg(long)]
        config: Option<PathBuf>,

        /// Optimizer steps per fold
        #[arg(long, default_value = "5")]
        steps: usize,

        /// Number of cross-validation folds
        #[arg(long, default_value = "10")]
        folds: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Cross-validated Adam sweep over learning rates for the best architectures
    TuneLr {
        /// Root holding composed datasets
        #[arg(short, long, default_value = "training_data")]
        data: PathBuf,

        /// Results root
        #[arg(short, long, default_value = "results_kan_adam")]
        out: PathBuf,

        /// JSON file with best architectures and learning rates
        #[arg(long)]
        config: Option<PathBuf>,

        /// Optimizer steps per fold; overrides the config file
        #[arg(long)]
        steps: Option<usize>,

        /// Number of cross-validation folds
        #[arg(long, default_value = "10")]
        folds: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Rank finished jobs by mean best test UAR
    Report {
        /// Results root to scan
        #[arg(short, long)]
        results: PathBuf,

        /// Number of jobs to show
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

fn print_stats(stats: &SweepStats, started: Instant) {
    println!();
    step_ok(&format!(
        "{} jobs run, {} already complete ({:.1?})",
        stats.completed,
        stats.skipped,
        started.elapsed()
    ));
    println!();
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_compose(csv: &Path, out: &Path, sexes: &[String]) -> Result<()> {
    let configs = if sexes.is_empty() {
        DatasetConfig::defaults()
    } else {
        sexes
            .iter()
            .map(|s| Sex::parse_selector(s).map(DatasetConfig::for_sex))
            .collect::<crate::error::Result<Vec<_>>>()?
    };

    section("Compose datasets");
    kv("Input", &csv.display().to_string());
    kv("Output", &out.display().to_string());
    println!();

    let written = compose_all(csv, out, &configs)
        .with_context(|| format!("composing datasets from {}", csv.display()))?;
    for dir in &written {
        step_ok(&dir.display().to_string());
    }
    println!();
    Ok(())
}

pub fn cmd_search(
    data: &Path,
    out: &Path,
    config: Option<&Path>,
    steps: usize,
    folds: usize,
    seed: u64,
) -> Result<()> {
    let space = match config {
        Some(path) => load_json::<SearchSpace>(path)?,
        None => SearchSpace::default(),
    };

    section("Parameter search");
    kv("Datasets", &data.display().to_string());
    kv("Results", &out.display().to_string());
    kv("Grid points", &space.len().to_string());
    kv("Optimizer", &format!("LBFGS, {} steps", steps));
    kv("Folds", &folds.to_string());
    println!();

    let started = Instant::now();
    let mut runner = SweepRunner::new(out)?.with_n_splits(folds).with_seed(seed);
    let stats = runner.run_param_search(data, &space, steps)?;
    print_stats(&stats, started);
    Ok(())
}

pub fn cmd_tune_lr(
    data: &Path,
    out: &Path,
    config: Option<&Path>,
    steps: Option<usize>,
    folds: usize,
    seed: u64,
) -> Result<()> {
    let mut lr_config = match config {
        Some(path) => load_json::<LrSearchConfig>(path)?,
        None => LrSearchConfig::default(),
    };
    if let Some(steps) = steps {
        lr_config = lr_config.with_steps(steps);
    }

    section("Learning-rate search");
    kv("Datasets", &data.display().to_string());
    kv("Results", &out.display().to_string());
    kv("Rates", &format!("{:?}", lr_config.learning_rates));
    kv("Optimizer", &format!("Adam, {} steps", lr_config.steps));
    println!();

    let started = Instant::now();
    let mut runner = SweepRunner::new(out)?.with_n_splits(folds).with_seed(seed);
    let stats = runner.run_lr_search(data, &lr_config)?;
    print_stats(&stats, started);
    Ok(())
}

pub fn cmd_report(results: &Path, top: usize) -> Result<()> {
    let report = SweepReport::scan(results)
        .with_context(|| format!("scanning {}", results.display()))?;

    section("Best jobs");
    if report.is_empty() {
        println!("  {}", "no finished jobs found".yellow());
        println!();
        return Ok(());
    }

    println!(
        "  {:>4}  {:>8} {:>8} {:>8} {:>6}  {}",
        muted("#"),
        muted("UAR"),
        muted("± std"),
        muted("acc"),
        muted("folds"),
        muted("job")
    );
    println!("  {}", dim(&"─".repeat(56)));

    for (rank, entry) in report.top(top).iter().enumerate() {
        let uar = format!("{:.4}", entry.best_test_uar.mean_score);
        let uar = if rank == 0 { uar.white().bold() } else { uar.white() };
        println!(
            "  {:>4}  {:>8} {:>8.4} {:>8.4} {:>6}  {}",
            accent(&(rank + 1).to_string()),
            uar,
            entry.best_test_uar.std_score,
            entry.final_test_acc,
            entry.best_test_uar.n_folds,
            entry.job
        );
    }

    println!("  {}", dim(&"─".repeat(56)));
    println!("  {}", dim(&format!("{} jobs scanned", report.len())));
    println!();
    Ok(())
}
