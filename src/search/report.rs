//! Ranking finished jobs from their fold histories

use super::job::JobKey;
use crate::error::Result;
use crate::training::{CVResults, FoldHistory};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Cross-validated score of one job directory
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// Job path relative to the results root
    pub job: JobKey,
    /// Best test UAR of each fold
    pub best_test_uar: CVResults,
    /// Final test accuracy averaged over folds
    pub final_test_acc: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    entries: Vec<ReportEntry>,
}

impl SweepReport {
    /// Load every job directory under `root` and rank by mean best test UAR
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let mut entries = Vec::new();

        for dir in job_dirs(root)? {
            let histories = load_histories(&dir)?;
            if histories.is_empty() {
                continue;
            }

            let best: Vec<f64> = histories
                .iter()
                .filter_map(|h| h.best(FoldHistory::TEST_UAR).map(|(_, v)| v))
                .collect();
            let finals: Vec<f64> = histories
                .iter()
                .filter_map(|h| h.get(FoldHistory::TEST_ACC).and_then(|s| s.last().copied()))
                .collect();
            let final_test_acc = if finals.is_empty() {
                0.0
            } else {
                finals.iter().sum::<f64>() / finals.len() as f64
            };

            let relative = dir.strip_prefix(root).unwrap_or(&dir);
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            entries.push(ReportEntry {
                job: JobKey::from(key),
                best_test_uar: CVResults::from_scores(best),
                final_test_acc,
            });
        }

        entries.sort_by(|a, b| {
            b.best_test_uar
                .mean_score
                .total_cmp(&a.best_test_uar.mean_score)
                .then_with(|| a.job.cmp(&b.job))
        });
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[ReportEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_fold_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with("kan_res_") && n.ends_with(".json"))
}

/// Directories below `root` that directly contain fold files, sorted
fn job_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut has_folds = false;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_fold_file(&path) {
                has_folds = true;
            }
        }
        if has_folds {
            found.push(dir);
        }
    }
    found.sort();
    Ok(found)
}

fn load_histories(dir: &Path) -> Result<Vec<FoldHistory>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_fold_file(p))
        .collect();
    files.sort();

    let mut histories = Vec::with_capacity(files.len());
    for file in files {
        match serde_json::from_reader(BufReader::new(File::open(&file)?)) {
            Ok(history) => histories.push(history),
            Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable fold file"),
        }
    }
    Ok(histories)
}
