//! Multi-layer KAN

use crate::error::{Result, VoxkanError};
use crate::kan::layer::{KanLayer, LayerCache};
use crate::kan::spline::SplineGrid;
use crate::kan::RegMetric;
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// KAN construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanConfig {
    /// Layer widths, input first, classes last
    pub width: Vec<usize>,
    /// Number of grid intervals
    pub grid: usize,
    /// Spline order
    pub k: usize,
    pub seed: u64,
    /// Scale of the random spline coefficients at initialisation
    pub noise_scale: f64,
    /// Scale of the random SiLU residual weights at initialisation
    pub base_scale: f64,
    pub grid_range: (f64, f64),
}

impl Default for KanConfig {
    fn default() -> Self {
        Self {
            width: vec![2, 5, 2],
            grid: 3,
            k: 3,
            seed: 42,
            noise_scale: 0.3,
            base_scale: 1.0,
            grid_range: (-1.0, 1.0),
        }
    }
}

impl KanConfig {
    pub fn new(width: Vec<usize>) -> Self {
        Self {
            width,
            ..Default::default()
        }
    }

    pub fn with_grid(mut self, grid: usize) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width.len() < 2 || self.width.contains(&0) {
            return Err(VoxkanError::InvalidParameter {
                name: "width".to_string(),
                value: format!("{:?}", self.width),
                reason: "need at least two non-zero layer widths".to_string(),
            });
        }
        if self.grid == 0 {
            return Err(VoxkanError::InvalidParameter {
                name: "grid".to_string(),
                value: self.grid.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.k == 0 {
            return Err(VoxkanError::InvalidParameter {
                name: "k".to_string(),
                value: self.k.to_string(),
                reason: "spline order must be at least 1".to_string(),
            });
        }
        let (lo, hi) = self.grid_range;
        if lo.is_nan() || hi.is_nan() || hi <= lo {
            return Err(VoxkanError::InvalidParameter {
                name: "grid_range".to_string(),
                value: format!("{:?}", self.grid_range),
                reason: "upper bound must exceed lower bound".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-layer activations of one forward pass
#[derive(Debug, Clone)]
pub struct ForwardCache {
    layers: Vec<LayerCache>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanNetwork {
    config: KanConfig,
    layers: Vec<KanLayer>,
}

impl KanNetwork {
    pub fn new(config: KanConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let (lo, hi) = config.grid_range;
        let layers = config
            .width
            .windows(2)
            .map(|w| {
                KanLayer::new(
                    w[0],
                    w[1],
                    SplineGrid::uniform(config.grid, config.k, lo, hi),
                    config.noise_scale,
                    config.base_scale,
                    &mut rng,
                )
            })
            .collect();

        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &KanConfig {
        &self.config
    }

    pub fn width(&self) -> &[usize] {
        &self.config.width
    }

    pub fn in_dim(&self) -> usize {
        self.config.width[0]
    }

    pub fn out_dim(&self) -> usize {
        self.config.width[self.config.width.len() - 1]
    }

    pub fn n_params(&self) -> usize {
        self.layers.iter().map(KanLayer::n_params).sum()
    }

    /// All parameters as one flat vector, layer by layer
    pub fn params(&self) -> Array1<f64> {
        let mut flat = Vec::with_capacity(self.n_params());
        for layer in &self.layers {
            layer.write_params(&mut flat);
        }
        Array1::from_vec(flat)
    }

    pub fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(VoxkanError::ShapeError {
                expected: format!("{} parameters", self.n_params()),
                actual: format!("{} parameters", params.len()),
            });
        }
        let flat = params.to_vec();
        let mut offset = 0;
        for layer in &mut self.layers {
            offset += layer.read_params(&flat[offset..]);
        }
        Ok(())
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.in_dim() {
            return Err(VoxkanError::ShapeError {
                expected: format!("{} input features", self.in_dim()),
                actual: format!("{} input features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Logits for every row of `x`
    pub fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let mut h = x.to_owned();
        for layer in &self.layers {
            h = layer.forward(&h);
        }
        Ok(h)
    }

    pub fn forward_with_cache(&self, x: &Array2<f64>) -> Result<(Array2<f64>, ForwardCache)> {
        self.check_input(x)?;
        let mut h = x.to_owned();
        let mut caches = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (out, cache) = layer.forward_with_cache(&h);
            caches.push(cache);
            h = out;
        }
        Ok((h, ForwardCache { layers: caches }))
    }

    /// Parameter gradient given the gradient of the logits
    pub fn backward(&self, cache: &ForwardCache, d_logits: &Array2<f64>) -> Array1<f64> {
        let mut per_layer: Vec<Vec<f64>> = Vec::with_capacity(self.layers.len());
        let mut delta = d_logits.to_owned();
        for (layer, layer_cache) in self.layers.iter().zip(cache.layers.iter()).rev() {
            let (grad, d_input) = layer.backward(layer_cache, &delta);
            per_layer.push(grad);
            delta = d_input;
        }
        per_layer.reverse();
        Array1::from_vec(per_layer.concat())
    }

    /// Sum of per-layer regularization terms and its parameter gradient
    pub fn regularization(
        &self,
        cache: &ForwardCache,
        metric: RegMetric,
        lamb_entropy: f64,
    ) -> (f64, Array1<f64>) {
        let mut total = 0.0;
        let mut grad = Vec::with_capacity(self.n_params());
        for (layer, layer_cache) in self.layers.iter().zip(cache.layers.iter()) {
            let (value, g) = layer.regularization(layer_cache, metric, lamb_entropy);
            total += value;
            grad.extend(g);
        }
        (total, Array1::from_vec(grad))
    }

    /// Predicted class per row (argmax of the logits)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let logits = self.forward(x)?;
        Ok(argmax_rows(&logits))
    }
}

pub(crate) fn argmax_rows(logits: &Array2<f64>) -> Array1<i64> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f64::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0 as i64
        })
        .collect()
}
