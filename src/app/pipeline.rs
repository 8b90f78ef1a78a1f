//! Shared "fit pipeline" logic used by the `fit` and `batch` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! ingest -> initial compartments -> fit -> residuals
//!
//! The CLI handlers can then focus on presentation (printing vs exporting).

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::{BatchConfig, CompartmentState, DailySeries, FitConfig, FitResult, SeriesSource};
use crate::error::AppError;
use crate::fit::{BatchJob, BatchOutcome, FitOptions, fit, fit_batch, observation_from_series};
use crate::io::ingest::{CountyIngest, load_county_series, load_daily_series, load_populations, load_state_counties};
use crate::report::{DayResidual, compute_residuals, recovered_fraction};

/// All computed outputs of a single `sir fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: CountyIngest,
    pub initial: CompartmentState,
    pub fit: FitResult,
    pub residuals: Vec<DayResidual>,
    pub recovered_fraction: f64,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let ingest = match &config.source {
        SeriesSource::County {
            csv_path,
            selector,
            from,
            to,
        } => load_county_series(csv_path, selector, *from, *to)?,
        SeriesSource::Daily { path } => load_daily_series(path)?,
    };

    run_fit_on_series(config, ingest)
}

/// Execute the fitting pipeline on an already-loaded series.
pub fn run_fit_on_series(config: &FitConfig, ingest: CountyIngest) -> Result<RunOutput, AppError> {
    let options = FitOptions::with_max_iterations(config.max_iterations)?;
    let values = &ingest.series.values;

    let (initial, observed) = observation_from_series(values, config.population, config.mode.kind())?;
    let fit = fit(&observed, &initial, &config.mode, &options)?;

    let residuals = compute_residuals(observed.values(), &fit, &ingest.series.dates)?;
    let recovered_fraction = recovered_fraction(values, config.population);

    Ok(RunOutput {
        ingest,
        initial,
        fit,
        residuals,
        recovered_fraction,
    })
}

/// Fit every county of a state that has a known population.
///
/// Counties missing from the population table (or without a FIPS code, such as
/// NYTimes "Unknown" rows) are skipped with a warning.
pub fn run_batch(config: &BatchConfig) -> Result<Vec<BatchOutcome>, AppError> {
    let counties = load_state_counties(&config.csv_path, &config.state, config.from, config.to)?;
    let populations = load_populations(&config.populations_path)?;
    let options = FitOptions::with_max_iterations(config.max_iterations)?;

    let jobs = build_jobs(counties.iter().map(|c| &c.series), &populations, config);
    if jobs.is_empty() {
        return Err(AppError::new(3, "No counties with a known population to fit."));
    }

    info!(jobs = jobs.len(), state = %config.state, "fitting counties");
    Ok(fit_batch(&jobs, &config.mode, &options))
}

fn build_jobs<'a>(
    series: impl Iterator<Item = &'a DailySeries>,
    populations: &HashMap<u32, f64>,
    config: &BatchConfig,
) -> Vec<BatchJob> {
    let mut jobs = Vec::new();
    for s in series {
        let Some(population) = s.fips.and_then(|f| populations.get(&f)).copied() else {
            warn!(county = %s.label, "no population for county; skipping");
            continue;
        };
        match observation_from_series(&s.values, population, config.mode.kind()) {
            Ok((initial, observed)) => jobs.push(BatchJob {
                label: s.label.clone(),
                initial,
                observed,
            }),
            Err(err) => warn!(county = %s.label, %err, "cannot build initial state; skipping"),
        }
    }
    jobs
}
