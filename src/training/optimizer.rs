//! Full-batch optimizers over a flat parameter vector

use crate::error::{Result, VoxkanError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Optimizer selection and its hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        lr: f64,
    },
    Lbfgs {
        lr: f64,
        history_size: usize,
        /// Inner iterations per optimizer step
        max_iter: usize,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::lbfgs()
    }
}

impl OptimizerConfig {
    pub fn adam(lr: f64) -> Self {
        OptimizerConfig::Adam { lr }
    }

    pub fn lbfgs() -> Self {
        OptimizerConfig::Lbfgs {
            lr: 1.0,
            history_size: 10,
            max_iter: 20,
        }
    }

    pub fn lr(&self) -> f64 {
        match self {
            OptimizerConfig::Adam { lr } | OptimizerConfig::Lbfgs { lr, .. } => *lr,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OptimizerConfig::Adam { .. } => "Adam",
            OptimizerConfig::Lbfgs { .. } => "LBFGS",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let lr = self.lr();
        if !lr.is_finite() || lr <= 0.0 {
            return Err(VoxkanError::InvalidParameter {
                name: "lr".to_string(),
                value: lr.to_string(),
                reason: "learning rate must be positive".to_string(),
            });
        }
        if let OptimizerConfig::Lbfgs {
            history_size,
            max_iter,
            ..
        } = self
        {
            if *history_size == 0 || *max_iter == 0 {
                return Err(VoxkanError::InvalidParameter {
                    name: "lbfgs".to_string(),
                    value: format!("history_size={}, max_iter={}", history_size, max_iter),
                    reason: "both must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fresh optimizer state for `n_params` parameters
    pub fn build(&self, n_params: usize) -> Optimizer {
        match *self {
            OptimizerConfig::Adam { lr } => Optimizer::Adam(Adam::new(n_params, lr)),
            OptimizerConfig::Lbfgs {
                lr,
                history_size,
                max_iter,
            } => Optimizer::Lbfgs(Lbfgs::new(lr, history_size, max_iter)),
        }
    }
}

impl fmt::Display for OptimizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(lr={})", self.label(), self.lr())
    }
}

/// Bias-corrected Adam
#[derive(Debug, Clone)]
pub struct Adam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    m: Array1<f64>,
    v: Array1<f64>,
    t: i32,
}

impl Adam {
    pub fn new(n_params: usize, lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: Array1::zeros(n_params),
            v: Array1::zeros(n_params),
            t: 0,
        }
    }

    pub fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>) {
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.lr);

        ndarray::Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 20;
const CURVATURE_EPS: f64 = 1e-10;
const GRAD_TOL: f64 = 1e-7;

/// Limited-memory BFGS with an Armijo backtracking line search
#[derive(Debug, Clone)]
pub struct Lbfgs {
    pub lr: f64,
    pub history_size: usize,
    pub max_iter: usize,
    history: VecDeque<(Array1<f64>, Array1<f64>)>,
}

impl Lbfgs {
    pub fn new(lr: f64, history_size: usize, max_iter: usize) -> Self {
        Self {
            lr,
            history_size,
            max_iter,
            history: VecDeque::with_capacity(history_size),
        }
    }

    /// Two-loop recursion: approximate `H·grad`
    fn direction(&self, grad: &Array1<f64>) -> Array1<f64> {
        let mut q = grad.clone();
        let mut alphas = Vec::with_capacity(self.history.len());
        for (s, y) in self.history.iter().rev() {
            let rho = 1.0 / y.dot(s);
            let alpha = rho * s.dot(&q);
            q.scaled_add(-alpha, y);
            alphas.push((alpha, rho));
        }

        if let Some((s, y)) = self.history.back() {
            q *= s.dot(y) / y.dot(y);
        }

        for ((s, y), (alpha, rho)) in self.history.iter().zip(alphas.into_iter().rev()) {
            let beta = rho * y.dot(&q);
            q.scaled_add(alpha - beta, s);
        }
        -q
    }

    /// Run up to `max_iter` iterations on `objective`, which returns the
    /// loss and its gradient at the given parameters. Returns the loss at
    /// the final parameters.
    pub fn step<F>(&mut self, params: &mut Array1<f64>, mut objective: F) -> Result<f64>
    where
        F: FnMut(&Array1<f64>) -> Result<(f64, Array1<f64>)>,
    {
        let (mut loss, mut grad) = objective(&*params)?;

        for iter in 0..self.max_iter {
            if grad.iter().map(|g| g.abs()).fold(0.0, f64::max) <= GRAD_TOL {
                break;
            }

            let mut direction = self.direction(&grad);
            let mut slope = grad.dot(&direction);
            if slope >= 0.0 || slope.is_nan() {
                // Not a descent direction; restart from steepest descent
                self.history.clear();
                direction = -&grad;
                slope = grad.dot(&direction);
            }

            // First iteration of a fresh history has no curvature scale
            let mut t = if self.history.is_empty() {
                self.lr * (1.0f64).min(1.0 / grad.iter().map(|g| g.abs()).sum::<f64>())
            } else {
                self.lr
            };

            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let candidate = &*params + &(&direction * t);
                let (new_loss, new_grad) = objective(&candidate)?;
                if new_loss.is_finite() && new_loss <= loss + ARMIJO_C1 * t * slope {
                    accepted = Some((candidate, new_loss, new_grad));
                    break;
                }
                t *= 0.5;
            }

            let Some((candidate, new_loss, new_grad)) = accepted else {
                debug!(iter, "line search failed, stopping early");
                break;
            };

            let s = &candidate - &*params;
            let y = &new_grad - &grad;
            if s.dot(&y) > CURVATURE_EPS {
                if self.history.len() == self.history_size {
                    self.history.pop_front();
                }
                self.history.push_back((s, y));
            }

            let improvement = loss - new_loss;
            *params = candidate;
            loss = new_loss;
            grad = new_grad;

            if improvement.abs() < 1e-12 {
                break;
            }
        }

        Ok(loss)
    }
}

/// Optimizer state owned by one training run
#[derive(Debug, Clone)]
pub enum Optimizer {
    Adam(Adam),
    Lbfgs(Lbfgs),
}

impl Optimizer {
    /// One optimizer step on `params`
    pub fn step<F>(&mut self, params: &mut Array1<f64>, mut objective: F) -> Result<f64>
    where
        F: FnMut(&Array1<f64>) -> Result<(f64, Array1<f64>)>,
    {
        match self {
            Optimizer::Adam(adam) => {
                let (loss, grad) = objective(&*params)?;
                adam.step(params, &grad);
                Ok(loss)
            }
            Optimizer::Lbfgs(lbfgs) => lbfgs.step(params, objective),
        }
    }
}
