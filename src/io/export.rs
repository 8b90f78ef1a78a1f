//! Export fit results, trajectories, and series.
//!
//! JSON for fit results (self-describing, easy to load in notebooks), plain CSV
//! for anything per-day so it opens in a spreadsheet.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::domain::{CompartmentState, FitResult, Trajectory};
use crate::error::AppError;
use crate::fit::BatchOutcome;

/// A single fit plus the context needed to interpret it.
#[derive(Debug, Clone, Serialize)]
pub struct FitRecord<'a> {
    pub tool: &'static str,
    pub label: &'a str,
    pub population: f64,
    pub initial: CompartmentState,
    pub recovered_fraction: f64,
    pub result: &'a FitResult,
}

/// Write one fit result as pretty JSON.
pub fn write_fit_json(path: &Path, record: &FitRecord<'_>) -> Result<(), AppError> {
    let file = create(path, "fit JSON")?;
    serde_json::to_writer_pretty(BufWriter::new(file), record)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))
}

/// Write every batch outcome (fitted or failed) as a pretty JSON array.
pub fn write_batch_json(path: &Path, outcomes: &[BatchOutcome]) -> Result<(), AppError> {
    let file = create(path, "batch JSON")?;
    serde_json::to_writer_pretty(BufWriter::new(file), outcomes)
        .map_err(|e| AppError::new(2, format!("Failed to write batch JSON: {e}")))
}

/// Write `day,susceptible,infected,recovered`, one row per simulated day.
pub fn write_trajectory_csv(path: &Path, trajectory: &Trajectory) -> Result<(), AppError> {
    let mut out = BufWriter::new(create(path, "trajectory CSV")?);

    writeln!(out, "day,susceptible,infected,recovered").map_err(write_error)?;
    for (day, s) in trajectory.states().iter().enumerate() {
        writeln!(
            out,
            "{day},{:.6},{:.6},{:.6}",
            s.susceptible, s.infected, s.recovered
        )
        .map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

/// Write a `day,value` series, readable by `load_daily_series`.
pub fn write_daily_series_csv(path: &Path, values: &[f64]) -> Result<(), AppError> {
    let mut out = BufWriter::new(create(path, "series CSV")?);

    writeln!(out, "day,value").map_err(write_error)?;
    for (day, v) in values.iter().enumerate() {
        writeln!(out, "{day},{v:.6}").map_err(write_error)?;
    }
    out.flush().map_err(write_error)
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn write_error(e: std::io::Error) -> AppError {
    AppError::new(2, format!("Failed to write export: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelParameters;
    use crate::io::ingest::load_daily_series;
    use crate::models::simulate;

    #[test]
    fn trajectory_csv_has_one_row_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.csv");
        let traj = simulate(CompartmentState::new(90.0, 10.0, 0.0), ModelParameters::new(3.0, 10.0), 2).unwrap();

        write_trajectory_csv(&path, &traj).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "day,susceptible,infected,recovered");
        assert_eq!(lines[1], "0,90.000000,10.000000,0.000000");
        assert_eq!(lines[2], "1,87.300000,11.700000,1.000000");
    }

    #[test]
    fn daily_series_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_daily_series_csv(&path, &[1.5, -2.0, 3.25]).unwrap();

        let ingest = load_daily_series(&path).unwrap();
        assert_eq!(ingest.series.values, vec![1.5, -2.0, 3.25]);
        assert_eq!(ingest.negative_days, 1);
    }
}
