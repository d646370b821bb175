//! Minority-class oversampling
//!
//! Provides the samplers used to rebalance each training fold:
//! - [`Smote`]: plain nearest-neighbour interpolation
//! - [`KMeansSmote`]: interpolation restricted to dense minority clusters
//! - [`CustomSmote`]: clustering-guided first, bounded retries, then plain SMOTE

mod custom;
mod kmeans_smote;
mod smote;

pub use custom::{CustomSmote, ResampleStrategy};
pub use kmeans_smote::KMeansSmote;
pub use smote::Smote;

use crate::error::{Result, VoxkanError};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Original rows followed by synthetic rows
    pub x: Array2<f64>,
    /// Labels aligned with `x`
    pub y: Array1<i64>,
    /// Number of synthetic samples generated per class
    pub n_synthetic: BTreeMap<i64, usize>,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Fit the sampler on data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    /// Resample data
    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult>;

    /// Fit and resample in one step
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Get class distribution, ordered by label
pub fn class_counts(y: &Array1<i64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Get row indices for each class, ordered by label
pub fn class_indices(y: &Array1<i64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_insert_with(Vec::new).push(i);
    }
    indices
}

/// Per-class target counts: every class is raised to
/// `floor(majority * sampling_strategy)` but never lowered.
pub(crate) fn target_counts(
    x: &Array2<f64>,
    y: &Array1<i64>,
    sampling_strategy: f64,
) -> Result<BTreeMap<i64, usize>> {
    if x.nrows() != y.len() {
        return Err(VoxkanError::ShapeError {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }

    let counts = class_counts(y);
    if counts.len() < 2 {
        return Err(VoxkanError::ValidationError(
            "Need at least 2 classes for oversampling".to_string(),
        ));
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    let targets: BTreeMap<i64, usize> = counts
        .iter()
        .map(|(&class, &count)| {
            let target = (max_count as f64 * sampling_strategy).floor() as usize;
            (class, target.max(count))
        })
        .collect();

    for (class, &target) in &targets {
        let count = counts[class];
        if target > count && count < 2 {
            return Err(VoxkanError::ValidationError(format!(
                "class {} has {} sample(s); interpolation needs at least 2",
                class, count
            )));
        }
    }

    Ok(targets)
}

/// Reject non-finite values in the rows of classes that will be interpolated
pub(crate) fn check_finite(x: &Array2<f64>, rows: &[usize]) -> Result<()> {
    for &i in rows {
        if x.row(i).iter().any(|v| !v.is_finite()) {
            return Err(VoxkanError::ValidationError(format!(
                "row {} contains non-finite values; neighbours are undefined",
                i
            )));
        }
    }
    Ok(())
}

/// Append synthetic rows after the original data
pub(crate) fn stack_result(
    x: &Array2<f64>,
    y: &Array1<i64>,
    synthetic_x: Vec<Vec<f64>>,
    synthetic_y: Vec<i64>,
    n_synthetic: BTreeMap<i64, usize>,
) -> ResampleResult {
    let n_original = x.nrows();
    let n_total = n_original + synthetic_x.len();
    let result_x = Array2::from_shape_fn((n_total, x.ncols()), |(i, j)| {
        if i < n_original {
            x[[i, j]]
        } else {
            synthetic_x[i - n_original][j]
        }
    });

    let mut all_y: Vec<i64> = y.iter().copied().collect();
    all_y.extend_from_slice(&synthetic_y);

    ResampleResult {
        x: result_x,
        y: Array1::from_vec(all_y),
        n_synthetic,
    }
}
