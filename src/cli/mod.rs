//! Command-line parsing for the SIR fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the simulation/fitting code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{FitModeKind, SyntheticObservable};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sir", version, about = "SIR epidemic simulator and parameter fitter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit R0 (and optionally d) to a county's case series, print diagnostics, and optionally plot/export.
    Fit(FitArgs),
    /// Run the simulator forward from an initial state.
    Simulate(SimulateArgs),
    /// Generate a synthetic `day,value` series from known parameters.
    Synth(SynthArgs),
    /// Fit every county in a state in parallel.
    Batch(BatchArgs),
}

/// Where a fit reads its series from.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// NYTimes `us-counties` CSV with cumulative cases.
    #[arg(long, value_name = "CSV", conflicts_with = "series")]
    pub csv: Option<PathBuf>,

    /// County name (with --state).
    #[arg(long, requires = "state", conflicts_with = "fips")]
    pub county: Option<String>,

    /// State name (with --county).
    #[arg(long, requires = "county")]
    pub state: Option<String>,

    /// County FIPS code (overrides county/state).
    #[arg(long)]
    pub fips: Option<u32>,

    /// First date to fit (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last date to fit (inclusive).
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Already-daily `day,value` CSV instead of a county CSV.
    #[arg(long, value_name = "CSV")]
    pub series: Option<PathBuf>,
}

/// Fit mode, guesses, bounds, and solver limits.
#[derive(Debug, Args, Clone)]
pub struct ModeArgs {
    /// Which parameters are free.
    #[arg(long, value_enum, default_value_t = FitModeKind::FixedD)]
    pub mode: FitModeKind,

    /// Recovery period (days) held fixed in fixed-d mode (default: 10).
    #[arg(long)]
    pub d: Option<f64>,

    /// Initial guess for R0 (default: 1.1 fixed-d, 2 joint).
    #[arg(long)]
    pub r_naught_guess: Option<f64>,

    /// Lower bound for R0 (default: 0.5).
    #[arg(long)]
    pub r_naught_min: Option<f64>,

    /// Upper bound for R0 (default: 15 fixed-d, 4 joint).
    #[arg(long)]
    pub r_naught_max: Option<f64>,

    /// Initial guess for d in joint mode (default: 10).
    #[arg(long)]
    pub d_guess: Option<f64>,

    /// Lower bound for d in joint mode (default: 5).
    #[arg(long)]
    pub d_min: Option<f64>,

    /// Upper bound for d in joint mode (default: 10).
    #[arg(long)]
    pub d_max: Option<f64>,

    /// Maximum solver iterations.
    #[arg(long = "max-iter", default_value_t = 200)]
    pub max_iter: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub fit: ModeArgs,

    /// County population (default: Allegheny County, PA).
    #[arg(long, default_value_t = 1_250_578.0)]
    pub population: f64,

    /// Show the N days with the largest residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Render an ASCII plot in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export the fit result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    #[arg(long)]
    pub s0: f64,

    #[arg(long)]
    pub i0: f64,

    #[arg(long, default_value_t = 0.0)]
    pub r0: f64,

    /// Basic reproduction number.
    #[arg(long)]
    pub r_naught: f64,

    /// Recovery period (days).
    #[arg(long)]
    pub d: f64,

    /// Number of days to simulate.
    #[arg(long)]
    pub days: usize,

    /// Write the trajectory to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    #[arg(long, default_value_t = 2.0)]
    pub r_naught: f64,

    #[arg(long, default_value_t = 10.0)]
    pub d: f64,

    #[arg(long, default_value_t = 1_000_000.0)]
    pub population: f64,

    #[arg(long, default_value_t = 1_000.0)]
    pub i0: f64,

    #[arg(long, default_value_t = 60)]
    pub days: usize,

    /// What each row holds.
    #[arg(long, value_enum, default_value_t = SyntheticObservable::NewInfections)]
    pub observable: SyntheticObservable,

    /// Relative standard deviation of multiplicative noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV (prints to stdout when omitted).
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct BatchArgs {
    /// NYTimes `us-counties` CSV with cumulative cases.
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// State whose counties are fitted.
    #[arg(long)]
    pub state: String,

    #[arg(long)]
    pub from: NaiveDate,

    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// `fips,population` CSV.
    #[arg(long, value_name = "CSV")]
    pub populations: PathBuf,

    #[command(flatten)]
    pub fit: ModeArgs,

    /// Write every county's outcome to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}
