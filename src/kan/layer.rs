//! A single KAN layer: one learnable spline edge per (input, output) pair

use crate::kan::spline::SplineGrid;
use crate::kan::RegMetric;
use ndarray::{Array1, Array2, Array3, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Normaliser floor for input ranges and entropy arguments
const EPS: f64 = 1e-4;

fn silu(x: f64) -> f64 {
    x / (1.0 + (-x).exp())
}

fn silu_derivative(x: f64) -> f64 {
    let s = 1.0 / (1.0 + (-x).exp());
    s * (1.0 + x * (1.0 - s))
}

/// Activations kept from the forward pass for backpropagation
#[derive(Debug, Clone)]
pub struct LayerCache {
    /// Layer input (n, in)
    input: Array2<f64>,
    /// Basis values (n, in, n_basis)
    basis: Array3<f64>,
    /// Basis derivatives (n, in, n_basis)
    dbasis: Array3<f64>,
    /// Un-weighted spline sums `Σ coef·B` per edge (n, in, out)
    spline: Array3<f64>,
}

/// Edge `(i, j)` computes `w_b·silu(x_i) + w_s·Σ_c coef_c·B_c(x_i)`.
/// Node `j` sums its incoming edges and adds a bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanLayer {
    in_dim: usize,
    out_dim: usize,
    grid: SplineGrid,
    /// Spline coefficients, one row per edge `i * out_dim + j`
    coef: Array2<f64>,
    base_weight: Array1<f64>,
    spline_weight: Array1<f64>,
    bias: Array1<f64>,
}

impl KanLayer {
    pub fn new<R: Rng>(
        in_dim: usize,
        out_dim: usize,
        grid: SplineGrid,
        noise_scale: f64,
        base_scale: f64,
        rng: &mut R,
    ) -> Self {
        let n_edges = in_dim * out_dim;
        let n_basis = grid.n_basis();
        let coef_scale = noise_scale / grid.grid_size() as f64;
        let coef = Array2::from_shape_fn((n_edges, n_basis), |_| {
            (rng.gen::<f64>() - 0.5) * coef_scale
        });
        let fan_in = (in_dim as f64).sqrt();
        let base_weight = Array1::from_shape_fn(n_edges, |_| {
            base_scale * (rng.gen::<f64>() * 2.0 - 1.0) / fan_in
        });

        Self {
            in_dim,
            out_dim,
            grid,
            coef,
            base_weight,
            spline_weight: Array1::ones(n_edges),
            bias: Array1::zeros(out_dim),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    fn edge(&self, i: usize, j: usize) -> usize {
        i * self.out_dim + j
    }

    pub fn n_params(&self) -> usize {
        self.coef.len() + self.base_weight.len() + self.spline_weight.len() + self.bias.len()
    }

    /// Append parameters in storage order: coef, base weights, spline weights, bias
    pub fn write_params(&self, out: &mut Vec<f64>) {
        out.extend(self.coef.iter());
        out.extend(self.base_weight.iter());
        out.extend(self.spline_weight.iter());
        out.extend(self.bias.iter());
    }

    /// Load parameters from the front of `src`; returns how many were consumed
    pub fn read_params(&mut self, src: &[f64]) -> usize {
        let mut offset = 0;
        for dst in [
            self.coef.as_slice_mut(),
            self.base_weight.as_slice_mut(),
            self.spline_weight.as_slice_mut(),
            self.bias.as_slice_mut(),
        ]
        .into_iter()
        .flatten()
        {
            let len = dst.len();
            dst.copy_from_slice(&src[offset..offset + len]);
            offset += len;
        }
        offset
    }

    /// Output of a single row
    fn forward_row(&self, x: ndarray::ArrayView1<f64>, mut out: ndarray::ArrayViewMut1<f64>) {
        out.assign(&self.bias);
        for (i, &xi) in x.iter().enumerate() {
            let basis = self.grid.basis(xi);
            let base = silu(xi);
            for j in 0..self.out_dim {
                let e = self.edge(i, j);
                let spline: f64 = self
                    .coef
                    .row(e)
                    .iter()
                    .zip(basis.iter())
                    .map(|(c, b)| c * b)
                    .sum();
                out[j] += self.base_weight[e] * base + self.spline_weight[e] * spline;
            }
        }
    }

    /// Inference-only forward pass, parallel over rows
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.out_dim));
        Zip::from(out.rows_mut())
            .and(x.rows())
            .par_for_each(|o, row| self.forward_row(row, o));
        out
    }

    /// Forward pass that keeps what `backward` and `regularization` need
    pub fn forward_with_cache(&self, x: &Array2<f64>) -> (Array2<f64>, LayerCache) {
        let n = x.nrows();
        let n_basis = self.grid.n_basis();
        let mut basis = Array3::zeros((n, self.in_dim, n_basis));
        let mut dbasis = Array3::zeros((n, self.in_dim, n_basis));
        let mut spline = Array3::zeros((n, self.in_dim, self.out_dim));
        let mut out = Array2::zeros((n, self.out_dim));

        for s in 0..n {
            for i in 0..self.in_dim {
                let xi = x[[s, i]];
                let (b, db) = self.grid.basis_with_derivative(xi);
                let base = silu(xi);
                for j in 0..self.out_dim {
                    let e = self.edge(i, j);
                    let value: f64 =
                        self.coef.row(e).iter().zip(b.iter()).map(|(c, b)| c * b).sum();
                    spline[[s, i, j]] = value;
                    out[[s, j]] += self.base_weight[e] * base + self.spline_weight[e] * value;
                }
                for c in 0..n_basis {
                    basis[[s, i, c]] = b[c];
                    dbasis[[s, i, c]] = db[c];
                }
            }
        }
        out += &self.bias;

        let cache = LayerCache {
            input: x.to_owned(),
            basis,
            dbasis,
            spline,
        };
        (out, cache)
    }

    /// Gradient of the parameters (storage order) and of the layer input,
    /// given the gradient of the layer output
    pub fn backward(&self, cache: &LayerCache, d_out: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
        let n = cache.input.nrows();
        let n_basis = self.grid.n_basis();
        let mut g_coef = Array2::<f64>::zeros(self.coef.raw_dim());
        let mut g_base = Array1::<f64>::zeros(self.base_weight.len());
        let mut g_spline = Array1::<f64>::zeros(self.spline_weight.len());
        let g_bias = d_out.sum_axis(Axis(0));
        let mut d_input = Array2::zeros((n, self.in_dim));

        for s in 0..n {
            for i in 0..self.in_dim {
                let xi = cache.input[[s, i]];
                let base = silu(xi);
                let dbase = silu_derivative(xi);
                let mut dx = 0.0;
                for j in 0..self.out_dim {
                    let g = d_out[[s, j]];
                    if g == 0.0 {
                        continue;
                    }
                    let e = self.edge(i, j);
                    let ws = self.spline_weight[e];
                    g_base[e] += g * base;
                    g_spline[e] += g * cache.spline[[s, i, j]];

                    let mut dspline = 0.0;
                    for c in 0..n_basis {
                        g_coef[[e, c]] += g * ws * cache.basis[[s, i, c]];
                        dspline += self.coef[[e, c]] * cache.dbasis[[s, i, c]];
                    }
                    dx += g * (self.base_weight[e] * dbase + ws * dspline);
                }
                d_input[[s, i]] = dx;
            }
        }

        let mut grad = Vec::with_capacity(self.n_params());
        grad.extend(g_coef.iter());
        grad.extend(g_base.iter());
        grad.extend(g_spline.iter());
        grad.extend(g_bias.iter());
        (grad, d_input)
    }

    /// Edge attribution `a_ij = mean_s |g_sij| / norm_i`
    fn attributions(&self, cache: &LayerCache, metric: RegMetric) -> Array2<f64> {
        let n = cache.input.nrows().max(1) as f64;
        let norms = self.input_norms(cache, metric);
        let mut attr = Array2::zeros((self.in_dim, self.out_dim));
        for ((i, j), a) in attr.indexed_iter_mut() {
            let sum: f64 = (0..cache.input.nrows())
                .map(|s| self.edge_term(cache, metric, s, i, j).abs())
                .sum();
            *a = sum / n / norms[i];
        }
        attr
    }

    fn input_norms(&self, cache: &LayerCache, metric: RegMetric) -> Array1<f64> {
        match metric {
            RegMetric::EdgeForwardSplineN => cache.input.std_axis(Axis(0), 0.0).mapv(|s| s + EPS),
            RegMetric::EdgeForwardSplineU | RegMetric::EdgeForwardSum => Array1::ones(self.in_dim),
        }
    }

    /// The quantity whose magnitude is penalised on edge `(i, j)` for row `s`
    fn edge_term(
        &self,
        cache: &LayerCache,
        metric: RegMetric,
        s: usize,
        i: usize,
        j: usize,
    ) -> f64 {
        let e = self.edge(i, j);
        let spline = self.spline_weight[e] * cache.spline[[s, i, j]];
        match metric {
            RegMetric::EdgeForwardSplineN | RegMetric::EdgeForwardSplineU => spline,
            RegMetric::EdgeForwardSum => {
                spline + self.base_weight[e] * silu(cache.input[[s, i]])
            }
        }
    }

    /// `Σ a_ij + λ_entropy·(mean row entropy + mean column entropy)` and its
    /// gradient with respect to this layer's parameters. Layer inputs are
    /// treated as constants.
    pub fn regularization(
        &self,
        cache: &LayerCache,
        metric: RegMetric,
        lamb_entropy: f64,
    ) -> (f64, Vec<f64>) {
        let attr = self.attributions(cache, metric);
        let norms = self.input_norms(cache, metric);
        let n_rows = cache.input.nrows();

        // dR/da_ij
        let mut d_attr = Array2::<f64>::ones(attr.raw_dim());
        let mut entropy_total = 0.0;

        // Entropy over inputs for each output node
        for j in 0..self.out_dim {
            let column = attr.column(j).to_owned();
            let (h, dh) = entropy_with_gradient(&column);
            entropy_total += h / self.out_dim as f64;
            for i in 0..self.in_dim {
                d_attr[[i, j]] += lamb_entropy * dh[i] / self.out_dim as f64;
            }
        }
        // Entropy over outputs for each input node
        for i in 0..self.in_dim {
            let row = attr.row(i).to_owned();
            let (h, dh) = entropy_with_gradient(&row);
            entropy_total += h / self.in_dim as f64;
            for j in 0..self.out_dim {
                d_attr[[i, j]] += lamb_entropy * dh[j] / self.in_dim as f64;
            }
        }

        let value = attr.sum() + lamb_entropy * entropy_total;

        let n_basis = self.grid.n_basis();
        let mut g_coef = Array2::<f64>::zeros(self.coef.raw_dim());
        let mut g_base = Array1::<f64>::zeros(self.base_weight.len());
        let mut g_spline = Array1::<f64>::zeros(self.spline_weight.len());

        for i in 0..self.in_dim {
            for j in 0..self.out_dim {
                let e = self.edge(i, j);
                let weight = d_attr[[i, j]] / (n_rows.max(1) as f64 * norms[i]);
                for s in 0..n_rows {
                    let term = self.edge_term(cache, metric, s, i, j);
                    let sign = if term > 0.0 {
                        1.0
                    } else if term < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                    if sign == 0.0 {
                        continue;
                    }
                    let w = weight * sign;
                    g_spline[e] += w * cache.spline[[s, i, j]];
                    for c in 0..n_basis {
                        g_coef[[e, c]] += w * self.spline_weight[e] * cache.basis[[s, i, c]];
                    }
                    if metric == RegMetric::EdgeForwardSum {
                        g_base[e] += w * silu(cache.input[[s, i]]);
                    }
                }
            }
        }

        let mut grad = Vec::with_capacity(self.n_params());
        grad.extend(g_coef.iter());
        grad.extend(g_base.iter());
        grad.extend(g_spline.iter());
        grad.extend(std::iter::repeat(0.0).take(self.out_dim));
        (value, grad)
    }
}

/// Shannon entropy of `a / Σa` and its gradient with respect to `a`
fn entropy_with_gradient(a: &Array1<f64>) -> (f64, Vec<f64>) {
    let total: f64 = a.sum();
    if total <= EPS * EPS {
        return (0.0, vec![0.0; a.len()]);
    }
    let logs: Vec<f64> = a.iter().map(|&v| (v / total).max(1e-12).ln()).collect();
    let h: f64 = -a
        .iter()
        .zip(logs.iter())
        .map(|(&v, &l)| v / total * l)
        .sum::<f64>();
    let grad = logs.iter().map(|&l| -(l + h) / total).collect();
    (h, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn layer(in_dim: usize, out_dim: usize) -> KanLayer {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let grid = SplineGrid::uniform(5, 3, -1.0, 1.0);
        let mut layer = KanLayer::new(in_dim, out_dim, grid, 1.0, 1.0, &mut rng);
        // Non-trivial spline weights so every parameter kind matters
        layer.spline_weight.mapv_inplace(|w| w * 0.7);
        layer
    }

    fn inputs() -> Array2<f64> {
        Array2::from_shape_fn((6, 3), |(s, i)| ((s * 3 + i) as f64 * 0.37).sin() * 0.9)
    }

    #[test]
    fn test_cached_forward_matches_parallel_forward() {
        let l = layer(3, 2);
        let x = inputs();
        let (cached, _) = l.forward_with_cache(&x);
        let plain = l.forward(&x);
        for (a, b) in cached.iter().zip(plain.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_params_roundtrip() {
        let l = layer(3, 2);
        let mut flat = Vec::new();
        l.write_params(&mut flat);
        assert_eq!(flat.len(), l.n_params());

        let mut other = layer(3, 2);
        other.bias.fill(9.0);
        assert_eq!(other.read_params(&flat), flat.len());
        assert_eq!(other.bias, l.bias);
    }

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let l = layer(3, 2);
        let x = inputs();
        let weights = Array2::from_shape_fn((6, 2), |(s, j)| 0.3 + s as f64 * 0.1 - j as f64 * 0.2);
        let (_, cache) = l.forward_with_cache(&x);
        let (_, d_input) = l.backward(&cache, &weights);

        let eps = 1e-6;
        for s in 0..6 {
            for i in 0..3 {
                let mut plus = x.clone();
                plus[[s, i]] += eps;
                let mut minus = x.clone();
                minus[[s, i]] -= eps;
                let f = |m: &Array2<f64>| (l.forward(m) * &weights).sum();
                let numeric = (f(&plus) - f(&minus)) / (2.0 * eps);
                assert!((numeric - d_input[[s, i]]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_regularization_gradient_matches_finite_difference() {
        for metric in [
            RegMetric::EdgeForwardSplineN,
            RegMetric::EdgeForwardSplineU,
            RegMetric::EdgeForwardSum,
        ] {
            let l = layer(3, 2);
            let x = inputs();
            let (_, cache) = l.forward_with_cache(&x);
            let (_, grad) = l.regularization(&cache, metric, 0.5);

            let mut flat = Vec::new();
            l.write_params(&mut flat);
            let eps = 1e-6;
            for p in (0..flat.len()).step_by(3) {
                let value_at = |delta: f64| {
                    let mut shifted = flat.clone();
                    shifted[p] += delta;
                    let mut trial = l.clone();
                    trial.read_params(&shifted);
                    let (_, c) = trial.forward_with_cache(&x);
                    trial.regularization(&c, metric, 0.5).0
                };
                let numeric = (value_at(eps) - value_at(-eps)) / (2.0 * eps);
                assert!(
                    (numeric - grad[p]).abs() < 1e-4,
                    "{:?} param {}: numeric {} analytic {}",
                    metric,
                    p,
                    numeric,
                    grad[p]
                );
            }
        }
    }

    #[test]
    fn test_entropy_of_uniform() {
        let (h, grad) = entropy_with_gradient(&Array1::from_vec(vec![1.0, 1.0, 1.0, 1.0]));
        assert!((h - 4.0f64.ln()).abs() < 1e-12);
        assert!(grad.iter().all(|g| g.abs() < 1e-12));
    }
}
