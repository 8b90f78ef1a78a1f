//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during simulation and fitting
//! - exported to JSON/CSV
//! - handed back to callers for reporting or plotting

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SirError;

/// Compartment sizes on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompartmentState {
    pub susceptible: f64,
    pub infected: f64,
    pub recovered: f64,
}

impl CompartmentState {
    pub fn new(susceptible: f64, infected: f64, recovered: f64) -> Self {
        Self {
            susceptible,
            infected,
            recovered,
        }
    }

    /// Population size `N = S + I + R`.
    pub fn total(&self) -> f64 {
        self.susceptible + self.infected + self.recovered
    }

    pub fn has_negative(&self) -> bool {
        self.susceptible < 0.0 || self.infected < 0.0 || self.recovered < 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.susceptible.is_finite() && self.infected.is_finite() && self.recovered.is_finite()
    }

    /// Check that this is a usable starting point for a simulation.
    pub fn validate_initial(&self) -> Result<(), SirError> {
        for (name, v) in [
            ("susceptible", self.susceptible),
            ("infected", self.infected),
            ("recovered", self.recovered),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(SirError::invalid(format!(
                    "initial {name} must be finite and >= 0, got {v}"
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(SirError::invalid("population size S+I+R must be > 0"));
        }
        Ok(())
    }
}

/// Day-by-day simulation output. Index `i` is day `i`; day 0 is the initial state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    states: Vec<CompartmentState>,
}

impl Trajectory {
    pub(crate) fn from_states(states: Vec<CompartmentState>) -> Self {
        Self { states }
    }

    pub fn states(&self) -> &[CompartmentState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of simulated steps (`len - 1`).
    pub fn n_days(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    pub fn initial(&self) -> Option<&CompartmentState> {
        self.states.first()
    }

    pub fn last(&self) -> Option<&CompartmentState> {
        self.states.last()
    }

    pub fn susceptible(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.susceptible).collect()
    }

    pub fn infected(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.infected).collect()
    }

    pub fn recovered(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.recovered).collect()
    }

    /// `I[k+1] - I[k]` for each step (length `n_days`).
    pub fn infected_differences(&self) -> Vec<f64> {
        self.states
            .windows(2)
            .map(|w| w[1].infected - w[0].infected)
            .collect()
    }

    /// First day on which any compartment is below zero (Euler overshoot).
    pub fn first_negative_day(&self) -> Option<usize> {
        self.states.iter().position(CompartmentState::has_negative)
    }
}

/// SIR rate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Basic reproduction number.
    pub r_naught: f64,
    /// Mean infectious period in days.
    pub d: f64,
}

impl ModelParameters {
    pub fn new(r_naught: f64, d: f64) -> Self {
        Self { r_naught, d }
    }

    /// Recovery rate `1/d`.
    pub fn gamma(&self) -> f64 {
        1.0 / self.d
    }

    /// Transmission rate `r_naught / d`.
    pub fn beta(&self) -> f64 {
        self.r_naught * self.gamma()
    }

    pub fn validate(&self) -> Result<(), SirError> {
        if !(self.r_naught.is_finite() && self.r_naught > 0.0) {
            return Err(SirError::invalid(format!(
                "r_naught must be finite and > 0, got {}",
                self.r_naught
            )));
        }
        if !(self.d.is_finite() && self.d > 0.0) {
            return Err(SirError::invalid(format!(
                "d must be finite and > 0, got {}",
                self.d
            )));
        }
        Ok(())
    }
}

/// Observed per-day values the fitter tries to reproduce. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSeries {
    values: Vec<f64>,
}

impl ObservedSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f64>> for ObservedSeries {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Search window for one free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSearch {
    pub guess: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ParamSearch {
    pub fn new(guess: f64, lower: f64, upper: f64) -> Self {
        Self { guess, lower, upper }
    }

    pub fn validate(&self, name: &str) -> Result<(), SirError> {
        if !(self.guess.is_finite() && self.lower.is_finite() && self.upper.is_finite()) {
            return Err(SirError::invalid(format!(
                "{name}: guess and bounds must be finite"
            )));
        }
        if self.lower > self.upper {
            return Err(SirError::invalid(format!(
                "{name}: lower bound {} exceeds upper bound {}",
                self.lower, self.upper
            )));
        }
        // Both parameters must stay strictly positive everywhere in the box.
        if self.lower <= 0.0 {
            return Err(SirError::invalid(format!(
                "{name}: lower bound must be > 0, got {}",
                self.lower
            )));
        }
        if self.guess < self.lower || self.guess > self.upper {
            return Err(SirError::invalid(format!(
                "{name}: initial guess {} outside bounds [{}, {}]",
                self.guess, self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Which parameters are free and what the fit compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FitMode {
    /// Fit `r_naught` with `d` held fixed, against daily differences of `I`.
    FixedD { d: f64, r_naught: ParamSearch },
    /// Fit `r_naught` and `d` jointly, against the infected compartment itself.
    Joint { r_naught: ParamSearch, d: ParamSearch },
}

impl FitMode {
    /// Recovery period held fixed by default in fixed-d mode.
    pub const FIXED_D: f64 = 10.0;
    /// Fixed-d search for `r_naught`: from 1.1 within `[0.5, 15]`.
    pub const FIXED_D_R_NAUGHT: ParamSearch = ParamSearch {
        guess: 1.1,
        lower: 0.5,
        upper: 15.0,
    };
    /// Joint search for `r_naught`: from 2 within `[0.5, 4]`.
    pub const JOINT_R_NAUGHT: ParamSearch = ParamSearch {
        guess: 2.0,
        lower: 0.5,
        upper: 4.0,
    };
    /// Joint search for `d`: from 10 within `[5, 10]`.
    pub const JOINT_D: ParamSearch = ParamSearch {
        guess: 10.0,
        lower: 5.0,
        upper: 10.0,
    };

    pub fn fixed_d_default() -> Self {
        FitMode::FixedD {
            d: Self::FIXED_D,
            r_naught: Self::FIXED_D_R_NAUGHT,
        }
    }

    pub fn joint_default() -> Self {
        FitMode::Joint {
            r_naught: Self::JOINT_R_NAUGHT,
            d: Self::JOINT_D,
        }
    }

    pub fn kind(&self) -> FitModeKind {
        match self {
            FitMode::FixedD { .. } => FitModeKind::FixedD,
            FitMode::Joint { .. } => FitModeKind::Joint,
        }
    }
}

/// Fit mode selector as exposed on the command line and in exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitModeKind {
    /// `r_naught` only, `d` fixed; fit daily new cases.
    FixedD,
    /// `r_naught` and `d`; fit the infected curve.
    Joint,
}

impl FitModeKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FitModeKind::FixedD => "fixed-d (r_naught only)",
            FitModeKind::Joint => "joint (r_naught, d)",
        }
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    ZeroResidual,
    CostTolerance,
    StepTolerance,
    GradientTolerance,
}

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub mode: FitModeKind,
    pub params: ModelParameters,
    /// Parameter covariance (free parameters only, in `[r_naught, d]` order).
    pub covariance: Option<Vec<Vec<f64>>>,
    pub std_errors: Option<Vec<f64>>,
    pub sse: f64,
    pub rmse: f64,
    pub n_obs: usize,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
    /// Model observable at the fitted parameters, aligned with the observed series.
    pub fitted: Vec<f64>,
    /// Trial evaluations whose trajectory went negative somewhere.
    pub negative_trial_evals: usize,
}

/// A per-day series produced by ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub label: String,
    /// Empty when the source only carries day indices.
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub fips: Option<u32>,
}

/// How to pick a county out of a NYTimes CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountySelector {
    Name { county: String, state: String },
    Fips(u32),
}

/// Where the fit input comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesSource {
    /// NYTimes `us-counties` CSV (cumulative cases).
    County {
        csv_path: PathBuf,
        selector: CountySelector,
        from: NaiveDate,
        to: Option<NaiveDate>,
    },
    /// Simple `day,value` CSV (already daily).
    Daily { path: PathBuf },
}

/// Resolved configuration for a `sir fit` run.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub source: SeriesSource,
    pub population: f64,
    pub mode: FitMode,
    pub max_iterations: usize,
    pub top_n: usize,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export_result: Option<PathBuf>,
}

/// Resolved configuration for a `sir simulate` run.
#[derive(Debug, Clone)]
pub struct SimulateConfig {
    pub initial: CompartmentState,
    pub params: ModelParameters,
    pub n_days: usize,
    pub export: Option<PathBuf>,
}

/// What the synthetic generator emits per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyntheticObservable {
    /// `I[k+1] - I[k]`; matches the fixed-d fit target.
    NewInfections,
    /// `I[k]`; matches the joint fit target.
    Infected,
}

/// Resolved configuration for a `sir synth` run.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub params: ModelParameters,
    pub population: f64,
    pub i0: f64,
    pub n_days: usize,
    pub observable: SyntheticObservable,
    /// Relative standard deviation of multiplicative noise (0 = exact).
    pub noise: f64,
    pub seed: u64,
    pub out: Option<PathBuf>,
}

/// Resolved configuration for a `sir batch` run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub csv_path: PathBuf,
    pub state: String,
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
    pub populations_path: PathBuf,
    pub mode: FitMode,
    pub max_iterations: usize,
    pub export: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_rates() {
        let p = ModelParameters::new(2.5, 5.0);
        assert!((p.gamma() - 0.2).abs() < 1e-15);
        assert!((p.beta() - 0.5).abs() < 1e-15);
    }

    #[test]
    fn param_search_rejects_inverted_and_outside() {
        assert!(ParamSearch::new(1.0, 2.0, 1.0).validate("r_naught").is_err());
        assert!(ParamSearch::new(20.0, 0.5, 15.0).validate("r_naught").is_err());
        assert!(ParamSearch::new(1.0, 0.0, 15.0).validate("r_naught").is_err());
        assert!(ParamSearch::new(1.1, 0.5, 15.0).validate("r_naught").is_ok());
        assert!(ParamSearch::new(3.0, 3.0, 3.0).validate("r_naught").is_ok());
    }

    #[test]
    fn infected_differences_have_n_days_entries() {
        let t = Trajectory::from_states(vec![
            CompartmentState::new(9.0, 1.0, 0.0),
            CompartmentState::new(8.0, 1.5, 0.5),
            CompartmentState::new(7.0, 2.0, 1.0),
        ]);
        assert_eq!(t.n_days(), 2);
        assert_eq!(t.infected_differences(), vec![0.5, 0.5]);
        assert_eq!(t.first_negative_day(), None);
    }

    #[test]
    fn fit_mode_serializes_with_kind_tag() {
        let json = serde_json::to_string(&FitMode::fixed_d_default()).unwrap();
        assert!(json.contains("\"kind\":\"fixed-d\""));
    }
}
