//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - wrap the simulator in a least-squares objective for each fit mode
//! - validate requests before any simulation
//! - fit many series in parallel (batch)

pub mod batch;
pub mod fitter;
pub mod options;

pub use batch::*;
pub use fitter::*;
pub use options::*;
