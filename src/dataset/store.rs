//! Composed datasets and their on-disk layout

use super::config::DatasetConfig;
use super::features::{parse_cell, FeatureTable};
use crate::error::{Result, VoxkanError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MATRIX_FILE: &str = "datasets.bin";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize)]
struct Arrays {
    x: Array2<f32>,
    y: Array1<i64>,
}

/// Feature matrix, labels and the selection they were composed from
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub x: Array2<f32>,
    pub y: Array1<i64>,
    pub config: DatasetConfig,
}

impl Dataset {
    pub fn new(x: Array2<f32>, y: Array1<i64>, config: DatasetConfig) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(VoxkanError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        Ok(Self { x, y, config })
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Features widened to `f64` for training
    pub fn features(&self) -> Array2<f64> {
        self.x.mapv(f64::from)
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let arrays = Arrays {
            x: self.x.clone(),
            y: self.y.clone(),
        };
        let writer = BufWriter::new(File::create(dir.join(MATRIX_FILE))?);
        bincode::serialize_into(writer, &arrays)?;

        let writer = BufWriter::new(File::create(dir.join(CONFIG_FILE))?);
        serde_json::to_writer(writer, &self.config)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let reader = BufReader::new(File::open(dir.join(MATRIX_FILE))?);
        let arrays: Arrays = bincode::deserialize_from(reader)?;

        let reader = BufReader::new(File::open(dir.join(CONFIG_FILE))?);
        let config: DatasetConfig = serde_json::from_reader(reader)?;

        Self::new(arrays.x, arrays.y, config)
    }
}

/// Select the configured patients and feature families from `table`
pub fn compose(table: &FeatureTable, config: &DatasetConfig) -> Result<Dataset> {
    let kept: Vec<usize> = table
        .feature_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| config.keeps_column(name))
        .map(|(i, _)| i)
        .collect();

    let mut values: Vec<f32> = Vec::new();
    let mut labels = Vec::new();
    let mut width: Option<usize> = None;

    for (row, record) in table.records().iter().enumerate() {
        if !config.selects(record.sex) {
            continue;
        }

        let mut features = Vec::new();
        for &col in &kept {
            let name = &table.feature_names()[col];
            features.extend(parse_cell(&record.cells[col], row + 1, name)?);
        }

        match width {
            None => width = Some(features.len()),
            Some(w) if w != features.len() => {
                return Err(VoxkanError::ShapeError {
                    expected: format!("{} features per row", w),
                    actual: format!(
                        "{} features in row {} ({})",
                        features.len(),
                        row + 1,
                        record.session_id
                    ),
                });
            }
            Some(_) => {}
        }

        values.extend(features.iter().map(|&v| v as f32));
        labels.push(record.pathology);
    }

    if labels.is_empty() {
        return Err(VoxkanError::DataError(format!(
            "no patients match the '{}' selection",
            config.dir_name()
        )));
    }

    let x = Array2::from_shape_vec((labels.len(), width.unwrap_or(0)), values)?;
    Dataset::new(x, Array1::from_vec(labels), config.clone())
}

/// Compose every configuration from `csv` into `<out_root>/<men|women|both>`.
/// Returns the written directories.
pub fn compose_all<P: AsRef<Path>, Q: AsRef<Path>>(
    csv: P,
    out_root: Q,
    configs: &[DatasetConfig],
) -> Result<Vec<PathBuf>> {
    let table = FeatureTable::from_csv(csv)?;
    let mut written = Vec::with_capacity(configs.len());

    for config in configs {
        let dataset = compose(&table, config)?;
        let dir = out_root.as_ref().join(config.dir_name());
        dataset.save(&dir)?;
        info!(
            dataset = config.dir_name(),
            samples = dataset.n_samples(),
            features = dataset.n_features(),
            "dataset written"
        );
        written.push(dir);
    }

    Ok(written)
}

/// Subdirectories of `root` holding a composed dataset, sorted by name
pub fn discover_datasets<P: AsRef<Path>>(root: P) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root.as_ref())? {
        let path = entry?.path();
        if path.is_dir() && path.join(MATRIX_FILE).is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                found.push((name.to_string(), path.clone()));
            }
        }
    }
    found.sort();
    Ok(found)
}
