//! Hyperparameter grid and candidate KAN architectures

use crate::kan::RegMetric;
use serde::{Deserialize, Serialize};

/// One point of the parameter grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub reg: RegMetric,
    pub entropy: f64,
    pub smoothing: f64,
    pub k: usize,
    pub grid: usize,
}

/// Values swept by the parameter search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub regularizations: Vec<RegMetric>,
    pub entropies: Vec<f64>,
    pub smoothings: Vec<f64>,
    pub ks: Vec<usize>,
    pub grids: Vec<usize>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            regularizations: RegMetric::ALL.to_vec(),
            entropies: vec![0.01, 0.1, 1.0],
            smoothings: vec![0.0, 0.2, 0.4],
            ks: vec![3, 4, 5],
            grids: vec![5, 6, 7, 8],
        }
    }
}

impl SearchSpace {
    pub fn with_regularizations(mut self, regularizations: Vec<RegMetric>) -> Self {
        self.regularizations = regularizations;
        self
    }

    pub fn with_entropies(mut self, entropies: Vec<f64>) -> Self {
        self.entropies = entropies;
        self
    }

    pub fn with_smoothings(mut self, smoothings: Vec<f64>) -> Self {
        self.smoothings = smoothings;
        self
    }

    pub fn with_ks(mut self, ks: Vec<usize>) -> Self {
        self.ks = ks;
        self
    }

    pub fn with_grids(mut self, grids: Vec<usize>) -> Self {
        self.grids = grids;
        self
    }

    pub fn len(&self) -> usize {
        self.regularizations.len()
            * self.entropies.len()
            * self.smoothings.len()
            * self.ks.len()
            * self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product; regularization varies slowest, grid fastest
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = Vec::with_capacity(self.len());
        for &reg in &self.regularizations {
            for &entropy in &self.entropies {
                for &smoothing in &self.smoothings {
                    for &k in &self.ks {
                        for &grid in &self.grids {
                            points.push(GridPoint {
                                reg,
                                entropy,
                                smoothing,
                                k,
                                grid,
                            });
                        }
                    }
                }
            }
        }
        points
    }
}

/// Eleven evenly spaced fractions from 0 to 2
fn width_fractions() -> impl Iterator<Item = f64> {
    (0..=10).map(|i| if i == 10 { 2.0 } else { i as f64 * 0.2 })
}

/// One and two hidden-layer architectures for `n_features` inputs.
///
/// Hidden widths are `2n - floor(a·n)` for `a` in `0, 0.2, .., 2`; the
/// second hidden layer is never wider than the first.
pub fn candidate_architectures(n_features: usize) -> Vec<Vec<usize>> {
    let n = n_features as i64;
    let width = |a: f64| 2 * n - (a * n as f64) as i64;

    let mut archs = Vec::new();
    for a in width_fractions() {
        let first = width(a);
        if first <= 0 {
            continue;
        }
        archs.push(vec![n_features, first as usize, 2]);
        for b in width_fractions() {
            let second = width(b);
            if first >= second && second > 0 {
                archs.push(vec![n_features, first as usize, second as usize, 2]);
            }
        }
    }
    archs
}

/// Path label of an architecture: `[21, 42, 26, 2]` → `21_42_26_2`
pub fn arch_label(arch: &[usize]) -> String {
    arch.iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("_")
}

/// Shortest round-trip rendering with a mandatory fraction and a signed,
/// two-digit exponent: `0.0`, `0.01`, `1.0`, `1e-05`.
pub fn format_float(value: f64) -> String {
    let repr = format!("{:?}", value);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}
