//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds run configs
//! - runs simulations and fits
//! - prints reports/plots
//! - writes optional exports

use std::io::Write;

use chrono::NaiveDate;
use clap::Parser;
use tracing::info;

use crate::cli::{BatchArgs, Command, FitArgs, ModeArgs, SimulateArgs, SourceArgs, SynthArgs};
use crate::domain::{
    BatchConfig, CompartmentState, CountySelector, FitConfig, FitMode, FitModeKind, ModelParameters, ParamSearch,
    SeriesSource, SimulateConfig, SynthConfig,
};
use crate::error::AppError;
use crate::fit::BatchStatus;
use crate::io::export::{FitRecord, write_batch_json, write_daily_series_csv, write_fit_json, write_trajectory_csv};

pub mod pipeline;

/// Entry point for the `sir` binary.
pub fn run() -> Result<(), AppError> {
    // `sir --csv ...` behaves like `sir fit --csv ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Synth(args) => handle_synth(args),
        Command::Batch(args) => handle_batch(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!(
        "{}",
        crate::report::format_fit_summary(
            &run.ingest.series.label,
            config.population,
            &run.initial,
            &run.fit,
            run.recovered_fraction,
        )
    );

    if run.ingest.negative_days > 0 || !run.ingest.row_errors.is_empty() {
        println!(
            "Input: {} rows read, {} skipped, {} negative daily counts kept\n",
            run.ingest.rows_read,
            run.ingest.row_errors.len(),
            run.ingest.negative_days
        );
    }

    let top = crate::report::largest_residuals(&run.residuals, config.top_n);
    println!("{}", crate::report::format_residual_table(&top));

    if config.plot {
        let plot = crate::plot::render_fit_plot(&run.residuals, config.plot_width, config.plot_height);
        println!("{plot}");
    }

    if let Some(path) = &config.export_result {
        let record = FitRecord {
            tool: "sir",
            label: &run.ingest.series.label,
            population: config.population,
            initial: run.initial,
            recovered_fraction: run.recovered_fraction,
            result: &run.fit,
        };
        write_fit_json(path, &record)?;
        info!(path = %path.display(), "wrote fit result");
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(&args);
    let trajectory = crate::models::simulate(config.initial, config.params, config.n_days)?;

    println!("{}", crate::report::format_trajectory_summary(&trajectory));

    if let Some(path) = &config.export {
        write_trajectory_csv(path, &trajectory)?;
        info!(path = %path.display(), "wrote trajectory");
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = synth_config_from_args(&args);
    let series = crate::data::generate_series(&config)?;

    match &config.out {
        Some(path) => {
            write_daily_series_csv(path, &series.values)?;
            info!(path = %path.display(), days = series.values.len(), "wrote synthetic series");
        }
        None => {
            let stdout = std::io::stdout();
            write_series(&mut stdout.lock(), &series.values)
                .map_err(|e| AppError::new(2, format!("Failed to write series: {e}")))?;
        }
    }
    Ok(())
}

fn write_series(out: &mut impl Write, values: &[f64]) -> std::io::Result<()> {
    writeln!(out, "day,value")?;
    for (day, v) in values.iter().enumerate() {
        writeln!(out, "{day},{v:.6}")?;
    }
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = batch_config_from_args(&args)?;
    let outcomes = pipeline::run_batch(&config)?;

    println!("{:<32} {:>10} {:>10} {:>12}  status", "county", "R0", "d", "RMSE");
    for o in &outcomes {
        match &o.status {
            BatchStatus::Fitted { result } => println!(
                "{:<32} {:>10.4} {:>10.4} {:>12.3}  ok",
                o.label, result.params.r_naught, result.params.d, result.rmse
            ),
            BatchStatus::Failed { error, .. } => println!("{:<32} {:>10} {:>10} {:>12}  {error}", o.label, "-", "-", "-"),
        }
    }

    if let Some(path) = &config.export {
        write_batch_json(path, &outcomes)?;
        info!(path = %path.display(), "wrote batch results");
    }
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    Ok(FitConfig {
        source: source_from_args(&args.source)?,
        population: args.population,
        mode: fit_mode_from_args(&args.fit)?,
        max_iterations: args.fit.max_iter,
        top_n: args.top,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_result: args.export.clone(),
    })
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        initial: CompartmentState::new(args.s0, args.i0, args.r0),
        params: ModelParameters::new(args.r_naught, args.d),
        n_days: args.days,
        export: args.export.clone(),
    }
}

pub fn synth_config_from_args(args: &SynthArgs) -> SynthConfig {
    SynthConfig {
        params: ModelParameters::new(args.r_naught, args.d),
        population: args.population,
        i0: args.i0,
        n_days: args.days,
        observable: args.observable,
        noise: args.noise,
        seed: args.seed,
        out: args.out.clone(),
    }
}

pub fn batch_config_from_args(args: &BatchArgs) -> Result<BatchConfig, AppError> {
    check_window(args.from, args.to)?;
    Ok(BatchConfig {
        csv_path: args.csv.clone(),
        state: args.state.clone(),
        from: args.from,
        to: args.to,
        populations_path: args.populations.clone(),
        mode: fit_mode_from_args(&args.fit)?,
        max_iterations: args.fit.max_iter,
        export: args.export.clone(),
    })
}

/// Start from the mode's defaults and apply any overrides.
///
/// Flags that belong to the other mode are rejected rather than ignored.
pub fn fit_mode_from_args(args: &ModeArgs) -> Result<FitMode, AppError> {
    let overridden = |base: ParamSearch, guess: Option<f64>, lower: Option<f64>, upper: Option<f64>| {
        ParamSearch::new(
            guess.unwrap_or(base.guess),
            lower.unwrap_or(base.lower),
            upper.unwrap_or(base.upper),
        )
    };
    let r_naught_base = match args.mode {
        FitModeKind::FixedD => FitMode::FIXED_D_R_NAUGHT,
        FitModeKind::Joint => FitMode::JOINT_R_NAUGHT,
    };
    let r_naught = overridden(r_naught_base, args.r_naught_guess, args.r_naught_min, args.r_naught_max);

    match args.mode {
        FitModeKind::FixedD => {
            if args.d_guess.is_some() || args.d_min.is_some() || args.d_max.is_some() {
                return Err(AppError::new(
                    2,
                    "--d-guess/--d-min/--d-max apply to --mode joint; use --d to set the fixed recovery period.",
                ));
            }
            Ok(FitMode::FixedD {
                d: args.d.unwrap_or(FitMode::FIXED_D),
                r_naught,
            })
        }
        FitModeKind::Joint => {
            if args.d.is_some() {
                return Err(AppError::new(
                    2,
                    "--d applies to --mode fixed-d; use --d-guess/--d-min/--d-max in joint mode.",
                ));
            }
            Ok(FitMode::Joint {
                r_naught,
                d: overridden(FitMode::JOINT_D, args.d_guess, args.d_min, args.d_max),
            })
        }
    }
}

fn source_from_args(args: &SourceArgs) -> Result<SeriesSource, AppError> {
    if let Some(path) = &args.series {
        return Ok(SeriesSource::Daily { path: path.clone() });
    }

    let Some(csv_path) = &args.csv else {
        return Err(AppError::new(2, "Provide either --csv (county data) or --series."));
    };
    let selector = match (&args.fips, &args.county, &args.state) {
        (Some(fips), _, _) => CountySelector::Fips(*fips),
        (None, Some(county), Some(state)) => CountySelector::Name {
            county: county.clone(),
            state: state.clone(),
        },
        _ => return Err(AppError::new(2, "Select a county with --fips or --county and --state.")),
    };
    let Some(from) = args.from else {
        return Err(AppError::new(2, "--from is required with --csv."));
    };
    check_window(from, args.to)?;

    Ok(SeriesSource::County {
        csv_path: csv_path.clone(),
        selector,
        from,
        to: args.to,
    })
}

fn check_window(from: NaiveDate, to: Option<NaiveDate>) -> Result<(), AppError> {
    match to {
        Some(to) if to < from => Err(AppError::new(2, format!("--to ({to}) is before --from ({from})."))),
        _ => Ok(()),
    }
}

/// Rewrite argv so `sir` defaults to `sir fit`.
///
/// Rules:
/// - `sir --csv data.csv ...`   -> `sir fit --csv data.csv ...`
/// - `sir --help/--version/-h`  -> unchanged (show top-level help/version)
/// - `sir`                      -> unchanged (clap prints usage)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "simulate" | "synth" | "batch");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fit flags".
    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_flags_default_to_fit() {
        assert_eq!(rewrite_args(argv(&["sir", "--series", "a.csv"])), argv(&["sir", "fit", "--series", "a.csv"]));
        assert_eq!(rewrite_args(argv(&["sir", "--help"])), argv(&["sir", "--help"]));
        assert_eq!(rewrite_args(argv(&["sir", "batch"])), argv(&["sir", "batch"]));
    }

    #[test]
    fn joint_mode_applies_overrides() {
        let cli = Cli::parse_from(["sir", "fit", "--series", "s.csv", "--mode", "joint", "--d-max", "12"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args).unwrap();

        assert_eq!(
            config.mode,
            FitMode::Joint {
                r_naught: ParamSearch::new(2.0, 0.5, 4.0),
                d: ParamSearch::new(10.0, 5.0, 12.0),
            }
        );
        assert_eq!(config.source, SeriesSource::Daily { path: "s.csv".into() });
    }

    #[test]
    fn fixed_d_uses_d_flag() {
        let cli = Cli::parse_from([
            "sir", "fit", "--csv", "c.csv", "--fips", "42003", "--from", "2021-12-25", "--d", "7", "--no-plot",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args).unwrap();

        assert_eq!(config.mode.kind(), FitModeKind::FixedD);
        assert!(matches!(config.mode, FitMode::FixedD { d, .. } if d == 7.0));
        assert!(!config.plot);
        assert!(matches!(
            config.source,
            SeriesSource::County { selector: CountySelector::Fips(42003), .. }
        ));
    }

    #[test]
    fn flags_for_the_other_mode_are_rejected() {
        let cli = Cli::parse_from(["sir", "fit", "--series", "s.csv", "--mode", "joint", "--d", "7"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(fit_config_from_args(&args).unwrap_err().exit_code(), 2);

        let cli = Cli::parse_from(["sir", "fit", "--series", "s.csv", "--d-min", "3"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(fit_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn fixed_d_defaults_without_flags() {
        let cli = Cli::parse_from(["sir", "fit", "--series", "s.csv"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(fit_config_from_args(&args).unwrap().mode, FitMode::fixed_d_default());
    }

    #[test]
    fn county_csv_requires_from() {
        let cli = Cli::parse_from(["sir", "fit", "--csv", "c.csv", "--fips", "1"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(fit_config_from_args(&args).unwrap_err().exit_code(), 2);
    }
}
