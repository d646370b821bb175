//! Feature scaling implementations

use crate::error::{Result, VoxkanError};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Per-column parameters of a fitted scaler: `x' = (x - data_min) / scale + min`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    data_min: Array1<f64>,
    scale: Array1<f64>,
}

/// Column-wise min-max scaler onto `[min, max]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    min: f64,
    max: f64,
    params: Option<ScalerParams>,
}

impl Scaler {
    /// Min-max scaler onto `[min, max]`
    pub fn min_max(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            params: None,
        }
    }

    /// Fit the scaler to the columns of `x`. Constant columns map to the
    /// lower bound.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(VoxkanError::ValidationError(
                "cannot fit a scaler on an empty matrix".to_string(),
            ));
        }
        let (min, max) = (self.min, self.max);
        if max.partial_cmp(&min) != Some(Ordering::Greater) {
            return Err(VoxkanError::InvalidParameter {
                name: "feature_range".to_string(),
                value: format!("({}, {})", min, max),
                reason: "upper bound must exceed lower bound".to_string(),
            });
        }

        let data_min = x.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
        let data_max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
        let range = &data_max - &data_min;
        let scale = range.mapv(|r| if r == 0.0 { 1.0 } else { r / (max - min) });

        self.params = Some(ScalerParams { data_min, scale });
        Ok(self)
    }

    fn fitted_params(&self, x: &Array2<f64>) -> Result<&ScalerParams> {
        let params = self.params.as_ref().ok_or(VoxkanError::ModelNotFitted)?;
        if params.data_min.len() != x.ncols() {
            return Err(VoxkanError::ShapeError {
                expected: format!("{} columns", params.data_min.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(params)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params(x)?;
        let offset = self.min;
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&params.data_min)
                .and(&params.scale)
                .for_each(|v, &lo, &s| *v = (*v - lo) / s + offset);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Undo the transform
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params(x)?;
        let offset = self.min;
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&params.data_min)
                .and(&params.scale)
                .for_each(|v, &lo, &s| *v = (*v - offset) * s + lo);
        }
        Ok(out)
    }
}

impl Default for Scaler {
    fn default() -> Self {
        Self::min_max(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_minmax_scaler_symmetric_range() {
        let x = array![[1.0, 10.0], [2.0, 30.0], [3.0, 20.0]];
        let mut scaler = Scaler::min_max(-1.0, 1.0);
        let result = scaler.fit_transform(&x).unwrap();

        assert_eq!(result.column(0).to_vec(), vec![-1.0, 0.0, 1.0]);
        assert_eq!(result.column(1).to_vec(), vec![-1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_minmax_constant_column_maps_to_lower_bound() {
        let x = array![[5.0], [5.0], [5.0]];
        let mut scaler = Scaler::min_max(-1.0, 1.0);
        let result = scaler.fit_transform(&x).unwrap();
        assert!(result.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_minmax_extrapolates_unseen_values() {
        let train = array![[0.0], [10.0]];
        let test = array![[20.0]];
        let mut scaler = Scaler::min_max(-1.0, 1.0);
        scaler.fit(&train).unwrap();
        assert_eq!(scaler.transform(&test).unwrap()[[0, 0]], 3.0);
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, -4.0], [2.5, 8.0], [7.0, 0.0]];
        let mut scaler = Scaler::min_max(-1.0, 1.0);
        let scaled = scaler.fit_transform(&x).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (o, r) in x.iter().zip(restored.iter()) {
            assert!((o - r).abs() < 1e-10);
        }
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let mut scaler = Scaler::min_max(1.0, -1.0);
        assert!(matches!(
            scaler.fit(&array![[1.0], [2.0]]),
            Err(VoxkanError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_transform_before_fit() {
        let scaler = Scaler::default();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(VoxkanError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_column_mismatch() {
        let mut scaler = Scaler::default();
        scaler.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(VoxkanError::ShapeError { .. })
        ));
    }
}
