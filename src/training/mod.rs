//! Model training
//!
//! - Stratified k-fold splitting
//! - K-means clustering (used by the cluster-guided oversampler)
//! - Adam and L-BFGS optimizers
//! - KAN training loop and classification metrics

pub mod clustering;
pub mod cross_validation;
pub mod metrics;
pub mod optimizer;
pub mod trainer;

pub use clustering::KMeans;
pub use cross_validation::{CVResults, CVSplit, CrossValidator};
pub use metrics::{ConfusionCounts, FoldHistory, FoldSummary};
pub use optimizer::{Adam, Lbfgs, Optimizer, OptimizerConfig};
pub use trainer::{evaluate, FitConfig, FoldData, KanTrainer};
