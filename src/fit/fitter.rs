//! SIR parameter fitting.
//!
//! Given:
//! - an initial compartment state `(s0, i0, r0)`
//! - an observed per-day series `y`
//! - a fit mode (which parameters are free, their guesses and bounds)
//!
//! we wrap the simulator in a residual function
//!
//! ```text
//! r(θ) = observable(simulate(s0, i0, r0, θ)) - y
//! ```
//!
//! and hand it to the bounded Levenberg–Marquardt solver.
//!
//! Observables per mode:
//! - `FixedD`: daily differences of `I` over `len(y)` simulated days
//!   (`len(y)` values).
//! - `Joint`: `I` itself over `len(y) - 1` simulated days (`len(y)` values,
//!   day 0 included).

use tracing::{info, warn};

use crate::domain::{
    CompartmentState, FitMode, FitModeKind, FitResult, ModelParameters, ObservedSeries, Trajectory,
};
use crate::error::SirError;
use crate::fit::options::FitOptions;
use crate::math::{covariance_from_jacobian, minimize_bounded};
use crate::models::simulate;

/// Fit the SIR model to `observed`.
///
/// # Errors
/// - `InvalidParameter` for an empty or non-finite series, unusable initial
///   state (including `i0 <= 0`), or inconsistent guesses/bounds. Nothing is
///   simulated in that case.
/// - `Convergence` if the solver exhausts `options.max_iterations()`.
/// - `NumericalInstability` if the objective turns non-finite, or the fitted
///   parameters drive a compartment negative.
pub fn fit(
    observed: &ObservedSeries,
    initial: &CompartmentState,
    mode: &FitMode,
    options: &FitOptions,
) -> Result<FitResult, SirError> {
    fit_with(observed, initial, mode, options, simulate)
}

pub(crate) fn fit_with<S>(
    observed: &ObservedSeries,
    initial: &CompartmentState,
    mode: &FitMode,
    options: &FitOptions,
    mut simulator: S,
) -> Result<FitResult, SirError>
where
    S: FnMut(CompartmentState, ModelParameters, usize) -> Result<Trajectory, SirError>,
{
    validate_request(observed, initial, mode)?;

    let y = observed.values();
    let kind = mode.kind();
    let n_days = observation_days(kind, y.len());
    let (x0, lower, upper) = search_box(mode);

    let mut negative_trial_evals = 0usize;
    let outcome = minimize_bounded(
        |x: &[f64]| {
            let traj = simulator(*initial, params_from(mode, x), n_days)?;
            if traj.first_negative_day().is_some() {
                negative_trial_evals += 1;
            }
            let model = observable(kind, &traj);
            Ok(model.iter().zip(y).map(|(m, o)| m - o).collect())
        },
        &x0,
        &lower,
        &upper,
        options,
    )?;

    if negative_trial_evals > 0 {
        warn!(
            negative_trial_evals,
            "trial parameters drove a compartment negative during the search"
        );
    }

    let params = params_from(mode, &outcome.x);
    let traj = simulator(*initial, params, n_days)?;
    if let Some(day) = traj.first_negative_day() {
        return Err(SirError::unstable(format!(
            "fitted parameters r_naught={:.6}, d={:.6} drive a compartment negative on day {day}",
            params.r_naught, params.d
        )));
    }
    let fitted = observable(kind, &traj);

    let covariance = covariance_from_jacobian(&outcome.jacobian, outcome.sse);
    let std_errors = covariance
        .as_ref()
        .map(|cov| (0..cov.nrows()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect());
    let covariance = covariance.map(|cov| {
        (0..cov.nrows())
            .map(|i| (0..cov.ncols()).map(|j| cov[(i, j)]).collect())
            .collect()
    });

    let n_obs = y.len();
    let rmse = (outcome.sse / n_obs as f64).sqrt();

    info!(
        mode = ?kind,
        r_naught = params.r_naught,
        d = params.d,
        sse = outcome.sse,
        iterations = outcome.iterations,
        termination = ?outcome.termination,
        "fit converged"
    );

    Ok(FitResult {
        mode: kind,
        params,
        covariance,
        std_errors,
        sse: outcome.sse,
        rmse,
        n_obs,
        iterations: outcome.iterations,
        evaluations: outcome.evaluations,
        termination: outcome.termination,
        fitted,
        negative_trial_evals,
    })
}

/// Build the initial state and fit target from a daily case series.
///
/// Day 0 seeds the infected compartment (`i0 = series[0]`, `r0 = 0`,
/// `s0 = population - i0`). Fixed-d fits compare against the remaining days;
/// joint fits compare against the whole series.
pub fn observation_from_series(
    series: &[f64],
    population: f64,
    kind: FitModeKind,
) -> Result<(CompartmentState, ObservedSeries), SirError> {
    let Some(&i0) = series.first() else {
        return Err(SirError::invalid("case series is empty"));
    };
    if !(population.is_finite() && population > 0.0) {
        return Err(SirError::invalid(format!("population must be > 0, got {population}")));
    }
    if i0 > population {
        return Err(SirError::invalid(format!(
            "initial infected {i0} exceeds population {population}"
        )));
    }

    let initial = CompartmentState::new(population - i0, i0, 0.0);
    let observed = match kind {
        FitModeKind::FixedD => ObservedSeries::new(series[1..].to_vec()),
        FitModeKind::Joint => ObservedSeries::new(series.to_vec()),
    };
    Ok((initial, observed))
}

/// Simulated days needed to produce one model value per observation.
pub fn observation_days(kind: FitModeKind, n_obs: usize) -> usize {
    match kind {
        FitModeKind::FixedD => n_obs,
        FitModeKind::Joint => n_obs.saturating_sub(1),
    }
}

/// Model observable compared against the data for a given mode.
pub fn observable(kind: FitModeKind, traj: &Trajectory) -> Vec<f64> {
    match kind {
        FitModeKind::FixedD => traj.infected_differences(),
        FitModeKind::Joint => traj.infected(),
    }
}

fn validate_request(
    observed: &ObservedSeries,
    initial: &CompartmentState,
    mode: &FitMode,
) -> Result<(), SirError> {
    if observed.is_empty() {
        return Err(SirError::invalid("observed series is empty"));
    }
    if let Some(idx) = observed.values().iter().position(|v| !v.is_finite()) {
        return Err(SirError::invalid(format!(
            "observed series has a non-finite value at day {idx}"
        )));
    }

    initial.validate_initial()?;
    if initial.infected <= 0.0 {
        return Err(SirError::invalid(format!(
            "initial infected must be > 0, got {}",
            initial.infected
        )));
    }

    match mode {
        FitMode::FixedD { d, r_naught } => {
            if !(d.is_finite() && *d > 0.0) {
                return Err(SirError::invalid(format!("fixed d must be finite and > 0, got {d}")));
            }
            r_naught.validate("r_naught")
        }
        FitMode::Joint { r_naught, d } => {
            r_naught.validate("r_naught")?;
            d.validate("d")
        }
    }
}

fn search_box(mode: &FitMode) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    match mode {
        FitMode::FixedD { r_naught, .. } => (
            vec![r_naught.guess],
            vec![r_naught.lower],
            vec![r_naught.upper],
        ),
        FitMode::Joint { r_naught, d } => (
            vec![r_naught.guess, d.guess],
            vec![r_naught.lower, d.lower],
            vec![r_naught.upper, d.upper],
        ),
    }
}

fn params_from(mode: &FitMode, x: &[f64]) -> ModelParameters {
    match mode {
        FitMode::FixedD { d, .. } => ModelParameters::new(x[0], *d),
        FitMode::Joint { .. } => ModelParameters::new(x[0], x[1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamSearch;

    fn synthetic_initial() -> CompartmentState {
        CompartmentState::new(999_000.0, 1_000.0, 0.0)
    }

    fn synthetic_trajectory() -> Trajectory {
        simulate(synthetic_initial(), ModelParameters::new(2.0, 10.0), 60).unwrap()
    }

    #[test]
    fn empty_series_is_rejected_before_simulating() {
        let mut calls = 0usize;
        let err = fit_with(
            &ObservedSeries::new(vec![]),
            &synthetic_initial(),
            &FitMode::fixed_d_default(),
            &FitOptions::default(),
            |initial, params, n| {
                calls += 1;
                simulate(initial, params, n)
            },
        )
        .unwrap_err();

        assert!(matches!(err, SirError::InvalidParameter(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn zero_initial_infected_is_rejected_before_simulating() {
        let mut calls = 0usize;
        let err = fit_with(
            &ObservedSeries::new(vec![1.0, 2.0, 3.0]),
            &CompartmentState::new(1_000.0, 0.0, 0.0),
            &FitMode::joint_default(),
            &FitOptions::default(),
            |initial, params, n| {
                calls += 1;
                simulate(initial, params, n)
            },
        )
        .unwrap_err();

        assert!(matches!(err, SirError::InvalidParameter(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn inconsistent_bounds_are_rejected() {
        let observed = ObservedSeries::new(synthetic_trajectory().infected_differences());
        let inverted = FitMode::FixedD {
            d: 10.0,
            r_naught: ParamSearch::new(1.1, 15.0, 0.5),
        };
        let outside = FitMode::Joint {
            r_naught: ParamSearch::new(2.0, 0.5, 4.0),
            d: ParamSearch::new(12.0, 5.0, 10.0),
        };
        let zero_d = FitMode::FixedD {
            d: 0.0,
            r_naught: ParamSearch::new(1.1, 0.5, 15.0),
        };

        for mode in [inverted, outside, zero_d] {
            let err = fit(&observed, &synthetic_initial(), &mode, &FitOptions::default()).unwrap_err();
            assert!(matches!(err, SirError::InvalidParameter(_)), "{mode:?}");
        }
    }

    #[test]
    fn fixed_d_recovers_r_naught() {
        let observed = ObservedSeries::new(synthetic_trajectory().infected_differences());
        let result = fit(
            &observed,
            &synthetic_initial(),
            &FitMode::fixed_d_default(),
            &FitOptions::default(),
        )
        .unwrap();

        assert!(((result.params.r_naught - 2.0) / 2.0).abs() < 0.01, "{result:?}");
        assert_eq!(result.params.d, 10.0);
        assert_eq!(result.fitted.len(), observed.len());
    }

    #[test]
    fn minimum_outside_bounds_lands_on_boundary() {
        let observed = ObservedSeries::new(synthetic_trajectory().infected_differences());
        let mode = FitMode::FixedD {
            d: 10.0,
            r_naught: ParamSearch::new(1.1, 0.5, 1.5),
        };
        let result = fit(&observed, &synthetic_initial(), &mode, &FitOptions::default()).unwrap();

        assert!(result.params.r_naught <= 1.5);
        assert!((result.params.r_naught - 1.5).abs() < 1e-9, "{}", result.params.r_naught);
    }

    #[test]
    fn negative_optimum_is_reported() {
        // A simulator whose output ignores the parameters and always overshoots.
        let err = fit_with(
            &ObservedSeries::new(vec![1.0, 1.0]),
            &CompartmentState::new(10.0, 1.0, 0.0),
            &FitMode::fixed_d_default(),
            &FitOptions::default(),
            |_, _, _| {
                Ok(Trajectory::from_states(vec![
                    CompartmentState::new(10.0, 1.0, 0.0),
                    CompartmentState::new(-1.0, 12.0, 0.0),
                    CompartmentState::new(-2.0, 13.0, 0.0),
                ]))
            },
        )
        .unwrap_err();

        assert!(matches!(err, SirError::NumericalInstability(_)));
    }

    #[test]
    fn series_is_split_per_mode() {
        let series = [5.0, 7.0, 9.0];
        let (initial, fixed) = observation_from_series(&series, 100.0, FitModeKind::FixedD).unwrap();
        assert_eq!(initial, CompartmentState::new(95.0, 5.0, 0.0));
        assert_eq!(fixed.values(), &[7.0, 9.0]);

        let (_, joint) = observation_from_series(&series, 100.0, FitModeKind::Joint).unwrap();
        assert_eq!(joint.values(), &series);

        assert!(observation_from_series(&[], 100.0, FitModeKind::Joint).is_err());
        assert!(observation_from_series(&[500.0], 100.0, FitModeKind::Joint).is_err());
    }
}
