//! Kolmogorov–Arnold Network
//!
//! A compact KAN for small tabular problems: every edge carries a learnable
//! B-spline plus a SiLU residual, nodes sum their incoming edges. The grid
//! is fixed at construction; there is no grid refinement or symbolic fitting.

mod layer;
mod loss;
mod network;
mod spline;

pub use layer::{KanLayer, LayerCache};
pub use loss::{cross_entropy, softmax};
pub use network::{ForwardCache, KanConfig, KanNetwork};
pub use spline::SplineGrid;

use crate::error::VoxkanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which edge quantity the sparsity regularizer penalises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegMetric {
    /// Spline output magnitude normalised by the spread of the edge input
    EdgeForwardSplineN,
    /// Full edge output magnitude (SiLU residual plus spline)
    EdgeForwardSum,
    /// Spline output magnitude, unnormalised
    EdgeForwardSplineU,
}

impl RegMetric {
    pub const ALL: [RegMetric; 3] = [
        RegMetric::EdgeForwardSplineN,
        RegMetric::EdgeForwardSum,
        RegMetric::EdgeForwardSplineU,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegMetric::EdgeForwardSplineN => "edge_forward_spline_n",
            RegMetric::EdgeForwardSum => "edge_forward_sum",
            RegMetric::EdgeForwardSplineU => "edge_forward_spline_u",
        }
    }
}

impl Default for RegMetric {
    fn default() -> Self {
        RegMetric::EdgeForwardSplineN
    }
}

impl fmt::Display for RegMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegMetric {
    type Err = VoxkanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegMetric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| VoxkanError::InvalidParameter {
                name: "reg_metric".to_string(),
                value: s.to_string(),
                reason: "expected edge_forward_spline_n, edge_forward_sum or edge_forward_spline_u"
                    .to_string(),
            })
    }
}
