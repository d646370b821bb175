//! B-spline basis on a uniform, extended knot grid

use serde::{Deserialize, Serialize};

/// Uniform knot grid of `grid_size` intervals over `[lo, hi]`, extended by
/// `order` knots on each side so that `grid_size + order` basis functions
/// cover the whole interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineGrid {
    knots: Vec<f64>,
    grid_size: usize,
    order: usize,
}

impl SplineGrid {
    pub fn uniform(grid_size: usize, order: usize, lo: f64, hi: f64) -> Self {
        let h = (hi - lo) / grid_size as f64;
        let knots = (0..=grid_size + 2 * order)
            .map(|i| lo + (i as f64 - order as f64) * h)
            .collect();
        Self {
            knots,
            grid_size,
            order,
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of basis functions (coefficients per edge)
    pub fn n_basis(&self) -> usize {
        self.grid_size + self.order
    }

    /// Cox–de Boor recursion up to `degree`; returns `knots.len() - 1 - degree` values
    fn basis_of_degree(&self, x: f64, degree: usize) -> Vec<f64> {
        let t = &self.knots;
        let mut b: Vec<f64> = (0..t.len() - 1)
            .map(|i| if t[i] <= x && x < t[i + 1] { 1.0 } else { 0.0 })
            .collect();

        for p in 1..=degree {
            b = (0..b.len() - 1)
                .map(|i| {
                    let left = (x - t[i]) / (t[i + p] - t[i]) * b[i];
                    let right = (t[i + p + 1] - x) / (t[i + p + 1] - t[i + 1]) * b[i + 1];
                    left + right
                })
                .collect();
        }
        b
    }

    /// Basis values at `x`
    pub fn basis(&self, x: f64) -> Vec<f64> {
        self.basis_of_degree(x, self.order)
    }

    /// Basis values and their derivatives with respect to `x`
    pub fn basis_with_derivative(&self, x: f64) -> (Vec<f64>, Vec<f64>) {
        let k = self.order;
        let t = &self.knots;
        let lower = self.basis_of_degree(x, k - 1);
        let n = self.n_basis();

        let mut value = Vec::with_capacity(n);
        let mut derivative = Vec::with_capacity(n);
        for i in 0..n {
            let d_left = t[i + k] - t[i];
            let d_right = t[i + k + 1] - t[i + 1];
            value.push(
                (x - t[i]) / d_left * lower[i] + (t[i + k + 1] - x) / d_right * lower[i + 1],
            );
            derivative.push(k as f64 * (lower[i] / d_left - lower[i + 1] / d_right));
        }
        (value, derivative)
    }
}
