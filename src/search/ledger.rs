//! Completed-job ledger for resumable sweeps

use super::job::{JobKey, JobSpec};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub completed_at: DateTime<Utc>,
    pub folds: usize,
    /// Training steps per fold. `None` for entries backfilled by older
    /// ledgers, which match any step count.
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl LedgerEntry {
    /// Whether this record covers a run of `job` with `n_splits` folds
    /// shuffled by `seed`
    pub fn covers(&self, job: &JobSpec, n_splits: usize, seed: u64) -> bool {
        self.folds >= n_splits
            && self.steps.map_or(true, |s| s == job.steps)
            && self.seed.map_or(true, |s| s == seed)
    }
}

/// Set of finished jobs keyed by their hyperparameter tuple, stored as
/// `ledger.json` at the results root.
#[derive(Debug, Clone)]
pub struct JobLedger {
    path: PathBuf,
    entries: BTreeMap<JobKey, LedgerEntry>,
}

impl JobLedger {
    /// Load the ledger under `root`, or start an empty one
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(LEDGER_FILE);
        let entries = if path.is_file() {
            serde_json::from_reader(BufReader::new(File::open(&path)?))?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), jobs = entries.len(), "ledger opened");
        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &JobKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `job` is already done with `n_splits` folds, the same step
    /// count and the same `seed`. Ledger entries recorded for a different
    /// run are stale and report incomplete. Jobs missing from the ledger
    /// whose directory under `root` already holds `n_splits` fold files are
    /// recorded as complete.
    pub fn is_complete<P: AsRef<Path>>(
        &mut self,
        job: &JobSpec,
        root: P,
        n_splits: usize,
        seed: u64,
    ) -> Result<bool> {
        let key = job.key();
        if let Some(entry) = self.get(&key) {
            if entry.covers(job, n_splits, seed) {
                return Ok(true);
            }
            info!(
                job = %key,
                folds = entry.folds,
                n_splits,
                steps = job.steps,
                seed,
                "ledger entry is stale, rerunning"
            );
            return Ok(false);
        }

        let folds = count_fold_files(&job.result_dir(root))?;
        if folds >= n_splits {
            info!(job = %key, folds, "found finished job outside the ledger");
            self.mark_complete(job, folds, seed)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn mark_complete(&mut self, job: &JobSpec, folds: usize, seed: u64) -> Result<()> {
        self.entries.insert(
            job.key(),
            LedgerEntry {
                completed_at: Utc::now(),
                folds,
                steps: Some(job.steps),
                seed: Some(seed),
            },
        );
        self.save()
    }

    /// Write to a temporary sibling, then rename over the ledger
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        serde_json::to_writer_pretty(BufWriter::new(File::create(&tmp)?), &self.entries)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn is_fold_file(name: &str) -> bool {
    name.starts_with("kan_res_") && name.ends_with(".json")
}

fn count_fold_files(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        if is_fold_file(&entry?.file_name().to_string_lossy()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Delete the fold histories of an earlier run of the job in `dir`
pub(crate) fn remove_fold_files(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if is_fold_file(&entry.file_name().to_string_lossy()) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
