//! Data preprocessing module
//!
//! Column-wise feature scaling applied to each fold after oversampling.

mod scaler;

pub use scaler::Scaler;
