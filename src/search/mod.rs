//! Cross-validated KAN sweeps
//!
//! A sweep is a list of [`JobSpec`]s: one hyperparameter tuple, one dataset
//! and one architecture each. [`SweepRunner`] cross-validates every job,
//! writes one history file per fold under the job's directory and records
//! finished jobs in a [`JobLedger`] so interrupted sweeps resume where they
//! stopped.

mod grid;
mod job;
mod ledger;
mod report;
mod runner;

pub use grid::{arch_label, candidate_architectures, format_float, GridPoint, SearchSpace};
pub use job::{fold_file_name, JobKey, JobSpec};
pub use ledger::{JobLedger, LedgerEntry, LEDGER_FILE};
pub use report::{ReportEntry, SweepReport};
pub use runner::{BestArch, JobOutcome, LrSearchConfig, SweepRunner, SweepStats};
