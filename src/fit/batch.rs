//! Fit many independent series (e.g. one per county) in parallel.
//!
//! Each job owns its inputs and runs its own solver; a failure in one job is
//! recorded on that job's outcome and never affects the others. Output order
//! matches input order.

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{CompartmentState, FitMode, FitResult, ObservedSeries};
use crate::error::SirError;
use crate::fit::fitter::fit;
use crate::fit::options::FitOptions;

/// One series to fit.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub label: String,
    pub initial: CompartmentState,
    pub observed: ObservedSeries,
}

/// Per-job result.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub label: String,
    #[serde(flatten)]
    pub status: BatchStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchStatus {
    Fitted { result: FitResult },
    Failed { error: String, exit_code: u8 },
}

impl BatchOutcome {
    fn from_result(label: String, result: Result<FitResult, SirError>) -> Self {
        let status = match result {
            Ok(result) => BatchStatus::Fitted { result },
            Err(err) => BatchStatus::Failed {
                exit_code: err.exit_code(),
                error: err.to_string(),
            },
        };
        Self { label, status }
    }

    pub fn fit(&self) -> Option<&FitResult> {
        match &self.status {
            BatchStatus::Fitted { result } => Some(result),
            BatchStatus::Failed { .. } => None,
        }
    }
}

/// Fit every job with the same mode and options.
pub fn fit_batch(jobs: &[BatchJob], mode: &FitMode, options: &FitOptions) -> Vec<BatchOutcome> {
    jobs.par_iter()
        .map(|job| {
            let result = fit(&job.observed, &job.initial, mode, options);
            BatchOutcome::from_result(job.label.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelParameters;
    use crate::models::simulate;

    #[test]
    fn failures_are_isolated_and_order_is_kept() {
        let initial = CompartmentState::new(99_000.0, 1_000.0, 0.0);
        let traj = simulate(initial, ModelParameters::new(2.5, 10.0), 40).unwrap();

        let jobs = vec![
            BatchJob {
                label: "good".to_string(),
                initial,
                observed: ObservedSeries::new(traj.infected_differences()),
            },
            BatchJob {
                label: "empty".to_string(),
                initial,
                observed: ObservedSeries::new(vec![]),
            },
            BatchJob {
                label: "no-infected".to_string(),
                initial: CompartmentState::new(100_000.0, 0.0, 0.0),
                observed: ObservedSeries::new(vec![1.0, 2.0]),
            },
        ];

        let out = fit_batch(&jobs, &FitMode::fixed_d_default(), &FitOptions::default());
        let labels: Vec<&str> = out.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["good", "empty", "no-infected"]);

        let good = out[0].fit().unwrap();
        assert!((good.params.r_naught - 2.5).abs() < 0.025);
        assert!(out[1].fit().is_none());
        assert!(matches!(out[2].status, BatchStatus::Failed { exit_code: 2, .. }));
    }
}
