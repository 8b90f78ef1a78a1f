//! Mathematical utilities: bounded nonlinear least squares and the small dense
//! solves it needs.

pub mod lm;
pub mod ols;

pub use lm::*;
pub use ols::*;
