//! Full-batch KAN training with per-step evaluation

use super::metrics::{ConfusionCounts, FoldHistory};
use super::optimizer::OptimizerConfig;
use crate::error::{Result, VoxkanError};
use crate::kan::{cross_entropy, KanNetwork, RegMetric};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Training hyperparameters of one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub optimizer: OptimizerConfig,
    pub steps: usize,
    /// Weight of the sparsity regularizer
    pub lamb: f64,
    /// Weight of the entropy part inside the regularizer
    pub lamb_entropy: f64,
    pub label_smoothing: f64,
    pub reg_metric: RegMetric,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::lbfgs(),
            steps: 5,
            lamb: 0.001,
            lamb_entropy: 2.0,
            label_smoothing: 0.0,
            reg_metric: RegMetric::default(),
        }
    }
}

impl FitConfig {
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_lamb(mut self, lamb: f64) -> Self {
        self.lamb = lamb;
        self
    }

    pub fn with_lamb_entropy(mut self, lamb_entropy: f64) -> Self {
        self.lamb_entropy = lamb_entropy;
        self
    }

    pub fn with_label_smoothing(mut self, label_smoothing: f64) -> Self {
        self.label_smoothing = label_smoothing;
        self
    }

    pub fn with_reg_metric(mut self, reg_metric: RegMetric) -> Self {
        self.reg_metric = reg_metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.optimizer.validate()?;
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(VoxkanError::InvalidParameter {
                name: "label_smoothing".to_string(),
                value: self.label_smoothing.to_string(),
                reason: "must lie in [0, 1)".to_string(),
            });
        }
        if self.lamb < 0.0 || self.lamb_entropy < 0.0 {
            return Err(VoxkanError::InvalidParameter {
                name: "lamb".to_string(),
                value: format!("lamb={}, lamb_entropy={}", self.lamb, self.lamb_entropy),
                reason: "regularization weights must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Scaled train/test split of one fold
#[derive(Debug, Clone)]
pub struct FoldData {
    pub train_x: Array2<f64>,
    pub train_y: Array1<i64>,
    pub test_x: Array2<f64>,
    pub test_y: Array1<i64>,
}

impl FoldData {
    fn validate(&self, model: &KanNetwork) -> Result<()> {
        if self.train_x.nrows() != self.train_y.len() || self.test_x.nrows() != self.test_y.len() {
            return Err(VoxkanError::ShapeError {
                expected: "one label per row".to_string(),
                actual: format!(
                    "train {}x? / {} labels, test {}x? / {} labels",
                    self.train_x.nrows(),
                    self.train_y.len(),
                    self.test_x.nrows(),
                    self.test_y.len()
                ),
            });
        }
        if self.train_x.is_empty() {
            return Err(VoxkanError::ValidationError("empty training set".to_string()));
        }
        let n_classes = model.out_dim() as i64;
        if let Some(bad) = self
            .train_y
            .iter()
            .chain(self.test_y.iter())
            .find(|&&y| y < 0 || y >= n_classes)
        {
            return Err(VoxkanError::ValidationError(format!(
                "label {} outside 0..{}",
                bad, n_classes
            )));
        }
        Ok(())
    }
}

/// Confusion counts of `model` on `(inputs, labels)`
pub fn evaluate(
    model: &KanNetwork,
    inputs: &Array2<f64>,
    labels: &Array1<i64>,
) -> Result<ConfusionCounts> {
    let predictions = model.predict(inputs)?;
    Ok(ConfusionCounts::from_predictions(&predictions, labels))
}

/// Cross-entropy of `model` on `(inputs, labels)`
fn data_loss(
    model: &KanNetwork,
    inputs: &Array2<f64>,
    labels: &Array1<i64>,
    smoothing: f64,
) -> Result<f64> {
    if inputs.nrows() == 0 {
        return Ok(0.0);
    }
    let logits = model.forward(inputs)?;
    Ok(cross_entropy(&logits, labels, smoothing).0)
}

pub struct KanTrainer;

impl KanTrainer {
    /// Train `model` on the fold's training split for `config.steps`
    /// optimizer steps, evaluating both splits after every step.
    pub fn fit(model: &mut KanNetwork, data: &FoldData, config: &FitConfig) -> Result<FoldHistory> {
        config.validate()?;
        data.validate(model)?;

        let mut optimizer = config.optimizer.build(model.n_params());
        let mut params = model.params();
        let mut history = FoldHistory::new();
        let mut trial = model.clone();

        for step in 0..config.steps {
            let objective = |p: &Array1<f64>| -> Result<(f64, Array1<f64>)> {
                trial.set_params(p)?;
                let (logits, cache) = trial.forward_with_cache(&data.train_x)?;
                let (loss, d_logits) =
                    cross_entropy(&logits, &data.train_y, config.label_smoothing);
                let mut grad = trial.backward(&cache, &d_logits);
                if config.lamb == 0.0 {
                    return Ok((loss, grad));
                }
                let (reg, reg_grad) =
                    trial.regularization(&cache, config.reg_metric, config.lamb_entropy);
                grad.scaled_add(config.lamb, &reg_grad);
                Ok((loss + config.lamb * reg, grad))
            };
            optimizer.step(&mut params, objective)?;
            model.set_params(&params)?;

            let (_, cache) = model.forward_with_cache(&data.train_x)?;
            let (reg, _) = model.regularization(&cache, config.reg_metric, config.lamb_entropy);
            let train_loss =
                data_loss(model, &data.train_x, &data.train_y, config.label_smoothing)?;
            let test_loss = data_loss(model, &data.test_x, &data.test_y, config.label_smoothing)?;
            if !train_loss.is_finite() {
                return Err(VoxkanError::TrainingError(format!(
                    "non-finite training loss at step {}",
                    step
                )));
            }

            history.push(FoldHistory::TRAIN_LOSS, train_loss.sqrt());
            history.push(FoldHistory::TEST_LOSS, test_loss.sqrt());
            history.push(FoldHistory::REG, reg);

            let train = evaluate(model, &data.train_x, &data.train_y)?;
            let test = evaluate(model, &data.test_x, &data.test_y)?;
            history.record_step(&train, &test);

            debug!(
                step,
                train_loss = train_loss.sqrt(),
                test_loss = test_loss.sqrt(),
                reg,
                test_uar = test.uar(),
                "step done"
            );
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kan::KanConfig;

    /// Two well-separated blobs in 2-D
    fn toy_fold() -> FoldData {
        let make = |n: usize, offset: f64| {
            let x = Array2::from_shape_fn((2 * n, 2), |(s, i)| {
                let side = if s < n { -0.5 } else { 0.5 };
                side + ((s * 7 + i * 3) as f64 + offset).sin() * 0.15
            });
            let y = Array1::from_shape_fn(2 * n, |s| if s < n { 0 } else { 1 });
            (x, y)
        };
        let (train_x, train_y) = make(20, 0.0);
        let (test_x, test_y) = make(6, 1.3);
        FoldData {
            train_x,
            train_y,
            test_x,
            test_y,
        }
    }

    fn model() -> KanNetwork {
        KanNetwork::new(KanConfig::new(vec![2, 3, 2]).with_grid(5).with_k(3).with_seed(1)).unwrap()
    }

    #[test]
    fn test_lbfgs_training_reduces_loss() {
        let data = toy_fold();
        let mut net = model();
        let config = FitConfig::default().with_steps(5);
        let history = KanTrainer::fit(&mut net, &data, &config).unwrap();

        let losses = history.get(FoldHistory::TRAIN_LOSS).unwrap();
        assert_eq!(losses.len(), 5);
        let initial = data_loss(&model(), &data.train_x, &data.train_y, 0.0).unwrap().sqrt();
        assert!(losses[4] < initial, "{} !< {}", losses[4], initial);
        assert!(history.get(FoldHistory::TEST_ACC).unwrap()[4] >= 0.9);
    }

    #[test]
    fn test_adam_training_reduces_loss() {
        let data = toy_fold();
        let mut net = model();
        let config = FitConfig::default()
            .with_optimizer(OptimizerConfig::adam(0.01))
            .with_steps(100);
        let history = KanTrainer::fit(&mut net, &data, &config).unwrap();

        let losses = history.get(FoldHistory::TRAIN_LOSS).unwrap();
        assert!(losses[99] < losses[0]);
    }

    #[test]
    fn test_history_has_every_metric() {
        let data = toy_fold();
        let mut net = model();
        let config = FitConfig::default().with_steps(2);
        let history = KanTrainer::fit(&mut net, &data, &config).unwrap();
        let keys: Vec<&str> = history.metrics().collect();
        for key in [
            FoldHistory::TRAIN_LOSS,
            FoldHistory::TEST_LOSS,
            FoldHistory::REG,
            FoldHistory::TRAIN_ACC,
            FoldHistory::TRAIN_UAR,
            FoldHistory::TEST_ACC,
            FoldHistory::TEST_TN,
            FoldHistory::TEST_TP,
            FoldHistory::TEST_FN,
            FoldHistory::TEST_FP,
            FoldHistory::TEST_UAR,
        ] {
            assert!(keys.contains(&key), "missing {}", key);
            assert_eq!(history.get(key).unwrap().len(), 2);
        }
        let total = ["test_tn", "test_tp", "test_fn", "test_fp"]
            .iter()
            .map(|k| history.get(k).unwrap()[1])
            .sum::<f64>();
        assert_eq!(total, data.test_y.len() as f64);
    }

    #[test]
    fn test_rejects_mismatched_labels() {
        let mut data = toy_fold();
        data.train_y = Array1::zeros(3);
        let mut net = model();
        assert!(KanTrainer::fit(&mut net, &data, &FitConfig::default()).is_err());
    }

    #[test]
    fn test_evaluate_is_explicit() {
        let data = toy_fold();
        let net = model();
        let a = evaluate(&net, &data.test_x, &data.test_y).unwrap();
        let b = evaluate(&net, &data.test_x, &data.test_y).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total(), data.test_y.len());
    }
}
