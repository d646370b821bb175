//! Dataset composition
//!
//! Reads the per-patient feature CSV, selects patients by sex and feature
//! families, and stores the resulting matrices under
//! `<root>/<men|women|both>/`.

mod config;
mod features;
mod store;

pub use config::{DatasetConfig, Sex};
pub use features::{parse_cell, FeatureTable, PatientRecord};
pub use store::{compose, compose_all, discover_datasets, Dataset, CONFIG_FILE, MATRIX_FILE};
