use crate::error::SirError;

/// Stopping rules and damping for the bounded least-squares solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    max_iterations: usize,
    ftol: f64,
    xtol: f64,
    gtol: f64,
    initial_damping: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

impl FitOptions {
    /// Creates validated options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if a tolerance is negative or non-finite, the
    /// damping is not strictly positive, or `max_iterations` is zero.
    pub fn new(
        max_iterations: usize,
        ftol: f64,
        xtol: f64,
        gtol: f64,
        initial_damping: f64,
    ) -> Result<Self, SirError> {
        if max_iterations == 0 {
            return Err(SirError::invalid("max_iterations must be >= 1"));
        }
        for (name, v) in [("ftol", ftol), ("xtol", xtol), ("gtol", gtol)] {
            if !v.is_finite() || v < 0.0 {
                return Err(SirError::invalid(format!("{name} must be finite and non-negative")));
            }
        }
        if !(initial_damping.is_finite() && initial_damping > 0.0) {
            return Err(SirError::invalid("initial_damping must be finite and > 0"));
        }

        Ok(Self {
            max_iterations,
            ftol,
            xtol,
            gtol,
            initial_damping,
        })
    }

    /// Defaults with a different iteration cap.
    pub fn with_max_iterations(max_iterations: usize) -> Result<Self, SirError> {
        let d = Self::default();
        Self::new(max_iterations, d.ftol, d.xtol, d.gtol, d.initial_damping)
    }

    /// Maximum number of trial steps (accepted or rejected).
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Relative reduction in SSE below which an accepted step counts as converged.
    #[must_use]
    pub fn ftol(&self) -> f64 {
        self.ftol
    }

    /// Relative step length below which the solver stops.
    #[must_use]
    pub fn xtol(&self) -> f64 {
        self.xtol
    }

    /// Cosine between residual and Jacobian columns below which the solver stops.
    #[must_use]
    pub fn gtol(&self) -> f64 {
        self.gtol
    }

    #[must_use]
    pub fn initial_damping(&self) -> f64 {
        self.initial_damping
    }
}
