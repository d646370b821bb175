//! voxkan - Dataset assembly and cross-validated KAN search
//!
//! Builds sex-split feature matrices from per-patient acoustic measures and
//! runs stratified k-fold sweeps of Kolmogorov–Arnold Network classifiers
//! over architectures, regularizers and learning rates.
//!
//! # Modules
//!
//! ## Data
//! - [`dataset`] - CSV ingestion, sex and feature-family selection, storage
//! - [`synthetic`] - Minority oversampling (SMOTE, KMeans-SMOTE, CustomSmote)
//! - [`preprocessing`] - Feature scaling
//!
//! ## Models
//! - [`kan`] - Spline-edge network, loss and regularization
//! - [`training`] - Cross-validation, optimizers, training loop, metrics
//!
//! ## Sweeps
//! - [`search`] - Parameter grids, job paths, ledger, runner, reports
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod dataset;
pub mod preprocessing;
pub mod synthetic;

// Models
pub mod kan;
pub mod training;

// Sweeps
pub mod cli;
pub mod search;

pub use error::{Result, VoxkanError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, VoxkanError};

    // Data
    pub use crate::dataset::{compose, compose_all, Dataset, DatasetConfig, FeatureTable, Sex};
    pub use crate::preprocessing::Scaler;
    pub use crate::synthetic::{CustomSmote, KMeansSmote, Sampler, Smote};

    // Models
    pub use crate::kan::{KanConfig, KanNetwork, RegMetric};
    pub use crate::training::{
        evaluate, ConfusionCounts, CrossValidator, FitConfig, FoldData, FoldHistory, KanTrainer,
        OptimizerConfig,
    };

    // Sweeps
    pub use crate::search::{
        JobLedger, JobSpec, LrSearchConfig, SearchSpace, SweepReport, SweepRunner,
    };
}
