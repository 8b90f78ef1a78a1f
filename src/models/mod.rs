//! Epidemic model implementations.
//!
//! Models are implemented as small, pure functions so that fitting code can
//! call them repeatedly with candidate parameters.

pub mod sir;

pub use sir::*;
