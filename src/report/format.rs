//! Reporting utilities: residuals, residual tables, and formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the simulation/fitting code stays clean and testable
//! - output changes are localized (snapshot tests live next to them)

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{CompartmentState, FitModeKind, FitResult, Trajectory};
use crate::error::AppError;

/// Observed vs fitted value on one day of the input series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayResidual {
    /// Index into the input daily series (day 0 seeds the model).
    pub day: usize,
    pub date: Option<NaiveDate>,
    pub observed: f64,
    pub fitted: f64,
    /// `observed - fitted`.
    pub residual: f64,
}

/// Pair the fitted values with the observations they were fitted against.
///
/// `dates` is the full input series' dates (may be empty). Fixed-d fits skip
/// day 0, so their first observation is day 1.
pub fn compute_residuals(
    observed: &[f64],
    fit: &FitResult,
    dates: &[NaiveDate],
) -> Result<Vec<DayResidual>, AppError> {
    if observed.len() != fit.fitted.len() {
        return Err(AppError::new(
            4,
            format!(
                "Fitted series has {} values but {} observations were fitted.",
                fit.fitted.len(),
                observed.len()
            ),
        ));
    }

    let offset = match fit.mode {
        FitModeKind::FixedD => 1,
        FitModeKind::Joint => 0,
    };

    let mut out = Vec::with_capacity(observed.len());
    for (k, (&y_obs, &y_fit)) in observed.iter().zip(&fit.fitted).enumerate() {
        if !y_fit.is_finite() {
            return Err(AppError::new(4, "Non-finite model value during residual computation."));
        }
        let day = k + offset;
        out.push(DayResidual {
            day,
            date: dates.get(day).copied(),
            observed: y_obs,
            fitted: y_fit,
            residual: y_obs - y_fit,
        });
    }
    Ok(out)
}

/// The `top_n` days with the largest absolute residual, largest first.
pub fn largest_residuals(residuals: &[DayResidual], top_n: usize) -> Vec<DayResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| {
        b.residual
            .abs()
            .partial_cmp(&a.residual.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}

/// Share of the population that appears in the case series.
pub fn recovered_fraction(series: &[f64], population: f64) -> f64 {
    series.iter().sum::<f64>() / population
}

/// Format the fit summary (inputs, parameters, diagnostics).
pub fn format_fit_summary(
    label: &str,
    population: f64,
    initial: &CompartmentState,
    fit: &FitResult,
    recovered_fraction: f64,
) -> String {
    let mut out = String::new();

    out.push_str("=== sir - SIR Parameter Fit ===\n");
    out.push_str(&format!("Series: {label}\n"));
    out.push_str(&format!("Mode: {}\n", fit.mode.display_name()));
    out.push_str(&format!(
        "Population: {population:.0} | s0={:.0} i0={:.0} r0={:.0}\n",
        initial.susceptible, initial.infected, initial.recovered
    ));
    out.push_str(&format!("Observations: n={}\n", fit.n_obs));

    out.push_str("\nParameters:\n");
    let se = fit.std_errors.as_deref();
    match fit.mode {
        FitModeKind::FixedD => {
            out.push_str(&format!("- R0   : {}\n", fmt_estimate(fit.params.r_naught, se.and_then(|s| s.first()))));
            out.push_str(&format!("- d    : {:.6} (fixed)\n", fit.params.d));
        }
        FitModeKind::Joint => {
            out.push_str(&format!("- R0   : {}\n", fmt_estimate(fit.params.r_naught, se.and_then(|s| s.first()))));
            out.push_str(&format!("- d    : {}\n", fmt_estimate(fit.params.d, se.and_then(|s| s.get(1)))));
        }
    }
    out.push_str(&format!("- beta : {:.6}\n", fit.params.beta()));
    out.push_str(&format!("- gamma: {:.6}\n", fit.params.gamma()));

    out.push_str("\nDiagnostics:\n");
    out.push_str(&format!("SSE={:.3} RMSE={:.3}\n", fit.sse, fit.rmse));
    out.push_str(&format!(
        "iterations={} evaluations={} stop={:?}\n",
        fit.iterations, fit.evaluations, fit.termination
    ));
    if fit.covariance.is_none() {
        out.push_str("covariance: unavailable (too few observations or singular Jacobian)\n");
    }
    if fit.negative_trial_evals > 0 {
        out.push_str(&format!(
            "warning: {} trial evaluations produced negative compartments\n",
            fit.negative_trial_evals
        ));
    }
    out.push_str(&format!("Recovered fraction: {:.4}%\n", recovered_fraction * 100.0));
    out.push('\n');

    out
}

/// Format the largest-residual table.
pub fn format_residual_table(rows: &[DayResidual]) -> String {
    let mut out = String::new();
    out.push_str("Largest residuals:\n");
    out.push_str(
        format!(
            "{:>5} {:<10} {:>12} {:>12} {:>12}",
            "day", "date", "observed", "fitted", "residual"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!(
        "{:-<5} {:-<10} {:-<12} {:-<12} {:-<12}\n",
        "", "", "", "", ""
    ));

    for r in rows {
        let date = r.date.map(|d| d.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{:>5} {:<10} {:>12.2} {:>12.2} {:>12.2}\n",
            r.day, date, r.observed, r.fitted, r.residual
        ));
    }

    out
}

/// Format a short summary of a simulated trajectory.
pub fn format_trajectory_summary(trajectory: &Trajectory) -> String {
    let mut out = String::new();
    out.push_str("=== sir - SIR Simulation ===\n");
    out.push_str(&format!("Days: {}\n", trajectory.n_days()));

    let infected = trajectory.infected();
    let peak = infected
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
    if let Some((day, value)) = peak {
        out.push_str(&format!("Peak infected: {value:.2} on day {day}\n"));
    }
    if let Some(last) = trajectory.last() {
        out.push_str(&format!(
            "Final: S={:.2} I={:.2} R={:.2}\n",
            last.susceptible, last.infected, last.recovered
        ));
    }
    if let Some(day) = trajectory.first_negative_day() {
        out.push_str(&format!("warning: a compartment goes negative on day {day}\n"));
    }

    out
}

fn fmt_estimate(value: f64, std_error: Option<&f64>) -> String {
    match std_error {
        Some(se) => format!("{value:.6} ± {se:.6}"),
        None => format!("{value:.6}"),
    }
}
