//! Classification metrics recorded during training

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Binary confusion matrix with class 1 as the positive (pathological) class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn from_predictions(predictions: &Array1<i64>, labels: &Array1<i64>) -> Self {
        let mut counts = Self::default();
        for (&p, &l) in predictions.iter().zip(labels.iter()) {
            match (p == 1, l == 1) {
                (true, true) => counts.tp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fp += 1,
                (false, true) => counts.fn_ += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Sensitivity: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// Unweighted average recall
    pub fn uar(&self) -> f64 {
        0.5 * (self.recall() + self.specificity())
    }
}

/// Zero denominators yield 0.0
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-step metric history of one cross-validation fold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldHistory {
    series: BTreeMap<String, Vec<f64>>,
}

impl FoldHistory {
    pub const TRAIN_LOSS: &'static str = "train_loss";
    pub const TEST_LOSS: &'static str = "test_loss";
    pub const REG: &'static str = "reg";
    pub const TRAIN_ACC: &'static str = "train_acc";
    pub const TRAIN_UAR: &'static str = "train_uar";
    pub const TEST_ACC: &'static str = "test_acc";
    pub const TEST_TN: &'static str = "test_tn";
    pub const TEST_TP: &'static str = "test_tp";
    pub const TEST_FN: &'static str = "test_fn";
    pub const TEST_FP: &'static str = "test_fp";
    pub const TEST_UAR: &'static str = "test_uar";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: &str, value: f64) {
        self.series.entry(metric.to_string()).or_default().push(value);
    }

    pub fn get(&self, metric: &str) -> Option<&[f64]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record the evaluation suite of one training step
    pub fn record_step(&mut self, train: &ConfusionCounts, test: &ConfusionCounts) {
        self.push(Self::TRAIN_ACC, train.accuracy());
        self.push(Self::TRAIN_UAR, train.uar());
        self.push(Self::TEST_ACC, test.accuracy());
        self.push(Self::TEST_TN, test.tn as f64);
        self.push(Self::TEST_TP, test.tp as f64);
        self.push(Self::TEST_FN, test.fn_ as f64);
        self.push(Self::TEST_FP, test.fp as f64);
        self.push(Self::TEST_UAR, test.uar());
    }

    /// Highest value of `metric`, with its step
    pub fn best(&self, metric: &str) -> Option<(usize, f64)> {
        self.get(metric)?
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if b >= v => best,
                _ if v.is_nan() => best,
                _ => Some((i, v)),
            })
    }

    /// Lowest value of `metric`, with its step
    pub fn lowest(&self, metric: &str) -> Option<(usize, f64)> {
        self.get(metric)?
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if b <= v => best,
                _ if v.is_nan() => best,
                _ => Some((i, v)),
            })
    }
}

/// Headline numbers of a fold, logged after training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldSummary {
    pub final_test_acc: f64,
    pub mean_test_acc: f64,
    pub best_test_uar: f64,
    pub best_test_uar_step: usize,
    pub best_train_uar_step: usize,
    pub best_train_loss_step: usize,
    pub best_test_loss_step: usize,
}

impl FoldSummary {
    pub fn from_history(history: &FoldHistory) -> Option<Self> {
        let test_acc = history.get(FoldHistory::TEST_ACC)?;
        let final_test_acc = *test_acc.last()?;
        let mean_test_acc = test_acc.iter().sum::<f64>() / test_acc.len() as f64;
        let (best_test_uar_step, best_test_uar) = history.best(FoldHistory::TEST_UAR)?;
        let (best_train_uar_step, _) = history.best(FoldHistory::TRAIN_UAR)?;
        let (best_train_loss_step, _) = history.lowest(FoldHistory::TRAIN_LOSS)?;
        let (best_test_loss_step, _) = history.lowest(FoldHistory::TEST_LOSS)?;

        Some(Self {
            final_test_acc,
            mean_test_acc,
            best_test_uar,
            best_test_uar_step,
            best_train_uar_step,
            best_train_loss_step,
            best_test_loss_step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_counts() {
        let pred = Array1::from_vec(vec![1, 1, 0, 0, 1, 0]);
        let labels = Array1::from_vec(vec![1, 0, 0, 1, 1, 0]);
        let c = ConfusionCounts::from_predictions(&pred, &labels);

        assert_eq!(c, ConfusionCounts { tp: 2, tn: 2, fp: 1, fn_: 1 });
        assert!((c.accuracy() - 4.0 / 6.0).abs() < 1e-12);
        assert!((c.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.specificity() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.uar() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_uar_with_missing_class() {
        let pred = Array1::from_vec(vec![0, 0, 0]);
        let labels = Array1::from_vec(vec![0, 0, 0]);
        let c = ConfusionCounts::from_predictions(&pred, &labels);
        assert_eq!(c.recall(), 0.0);
        assert_eq!(c.specificity(), 1.0);
        assert_eq!(c.uar(), 0.5);
    }

    #[test]
    fn test_history_best_and_lowest() {
        let mut h = FoldHistory::new();
        for v in [0.2, 0.9, 0.9, 0.4] {
            h.push(FoldHistory::TEST_UAR, v);
        }
        assert_eq!(h.best(FoldHistory::TEST_UAR), Some((1, 0.9)));
        assert_eq!(h.lowest(FoldHistory::TEST_UAR), Some((0, 0.2)));
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn test_history_serializes_as_plain_map() {
        let mut h = FoldHistory::new();
        h.push(FoldHistory::TEST_ACC, 0.5);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"test_acc":[0.5]}"#);
    }

    #[test]
    fn test_summary() {
        let mut h = FoldHistory::new();
        let steps = [
            (1.0, 0.9, 0.5, 0.5, 0.4),
            (0.8, 0.7, 0.6, 0.7, 0.6),
            (0.6, 0.8, 0.7, 0.6, 0.8),
        ];
        for (train_loss, test_loss, train_uar, test_uar, test_acc) in steps {
            h.push(FoldHistory::TRAIN_LOSS, train_loss);
            h.push(FoldHistory::TEST_LOSS, test_loss);
            h.push(FoldHistory::TRAIN_UAR, train_uar);
            h.push(FoldHistory::TEST_UAR, test_uar);
            h.push(FoldHistory::TEST_ACC, test_acc);
        }
        let s = FoldSummary::from_history(&h).unwrap();
        assert_eq!(s.final_test_acc, 0.8);
        assert_eq!(s.best_test_uar_step, 1);
        assert_eq!(s.best_train_uar_step, 2);
        assert_eq!(s.best_train_loss_step, 2);
        assert_eq!(s.best_test_loss_step, 1);
        assert!((s.mean_test_acc - 0.6).abs() < 1e-12);
    }
}
