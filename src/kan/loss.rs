//! Softmax cross-entropy with label smoothing

use ndarray::{Array1, Array2, Axis};

/// Row-wise softmax
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Mean cross-entropy of `logits` against smoothed one-hot targets
/// `(1 - ε)·onehot + ε / C`, and its gradient with respect to the logits.
pub fn cross_entropy(
    logits: &Array2<f64>,
    labels: &Array1<i64>,
    smoothing: f64,
) -> (f64, Array2<f64>) {
    let n = logits.nrows();
    let n_classes = logits.ncols();
    if n == 0 {
        return (0.0, Array2::zeros(logits.raw_dim()));
    }

    let probs = softmax(logits);
    let off = smoothing / n_classes as f64;
    let mut grad = probs.clone();
    let mut loss = 0.0;

    for (s, (mut g, p)) in grad
        .axis_iter_mut(Axis(0))
        .zip(probs.axis_iter(Axis(0)))
        .enumerate()
    {
        let label = labels[s] as usize;
        for c in 0..n_classes {
            let target = if c == label { 1.0 - smoothing + off } else { off };
            loss -= target * p[c].max(1e-300).ln();
            g[c] -= target;
        }
    }

    grad /= n as f64;
    (loss / n as f64, grad)
}
