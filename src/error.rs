//! Error types.
//!
//! - `SirError`: failures of the simulator/fitter core, one variant per kind so
//!   callers can match on them.
//! - `AppError`: what the `sir` binary reports, carrying a process exit code.

use thiserror::Error;

/// Errors raised by the simulation and fitting core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SirError {
    /// A parameter, initial state, bound, or observed series is unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The optimizer ran out of iterations before meeting any tolerance.
    #[error("fit did not converge after {iterations} iterations (cost={cost:.6e})")]
    Convergence { iterations: usize, cost: f64 },

    /// The objective produced a non-finite value, or the optimum is unphysical.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
}

impl SirError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn unstable(message: impl Into<String>) -> Self {
        Self::NumericalInstability(message.into())
    }

    /// Exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            SirError::InvalidParameter(_) => 2,
            SirError::Convergence { .. } => 3,
            SirError::NumericalInstability(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<SirError> for AppError {
    fn from(err: SirError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
