//! Reporting utilities: residuals and formatted output.

pub mod format;

pub use format::*;
