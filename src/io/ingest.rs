//! CSV ingest and normalization.
//!
//! This module turns case-count CSVs into clean per-day series that are safe to
//! fit. Supported inputs:
//!
//! - NYTimes `us-counties` format: `date,county,state,fips,cases[,deaths]` with
//!   **cumulative** cases; converted to daily new cases per county.
//! - A plain `day,value` series that is already daily.
//! - A `fips,population` lookup table for batch runs.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (stable ordering by date, then input order)
//! - **Separation of concerns**: no fitting logic here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{CountySelector, DailySeries};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// One county's daily series plus ingest diagnostics.
#[derive(Debug, Clone)]
pub struct CountyIngest {
    pub series: DailySeries,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Days whose differenced count is negative (reporting corrections).
    pub negative_days: usize,
}

#[derive(Debug, Clone)]
struct CountyRow {
    date: NaiveDate,
    county: String,
    state: String,
    fips: Option<u32>,
    /// `None` when the cell is blank or unparseable.
    cumulative: Option<f64>,
}

/// Load one county from a NYTimes `us-counties` CSV.
///
/// Cumulative cases are differenced over the county's full history (the first
/// row becomes 0) *before* the `[from, to]` window is applied, so the first day
/// in the window carries a real daily count.
pub fn load_county_series(
    path: &Path,
    selector: &CountySelector,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> Result<CountyIngest, AppError> {
    let (rows, row_errors, rows_read) = read_county_rows(path)?;

    let mut matched: Vec<CountyRow> = rows
        .into_iter()
        .filter(|r| matches_selector(r, selector))
        .collect();
    if matched.is_empty() {
        return Err(AppError::new(
            3,
            format!("No rows matched {}.", describe_selector(selector)),
        ));
    }

    matched.sort_by_key(|r| r.date);
    let label = format!("{}, {}", matched[0].county, matched[0].state);
    let fips = matched[0].fips;
    let series = windowed_daily(&matched, label, fips, from, to)?;

    let negative_days = series.values.iter().filter(|&&v| v < 0.0).count();
    if negative_days > 0 {
        warn!(negative_days, county = %series.label, "daily counts contain negative corrections");
    }
    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), "skipped unparseable CSV rows");
    }
    debug!(county = %series.label, days = series.values.len(), "loaded county series");

    Ok(CountyIngest {
        series,
        row_errors,
        rows_read,
        negative_days,
    })
}

/// Load every county of `state` (case-insensitive), sorted by county name.
///
/// Counties with no rows inside the window are dropped.
pub fn load_state_counties(
    path: &Path,
    state: &str,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> Result<Vec<CountyIngest>, AppError> {
    let (rows, row_errors, rows_read) = read_county_rows(path)?;
    let state = state.trim().to_lowercase();

    let mut by_county: BTreeMap<String, Vec<CountyRow>> = BTreeMap::new();
    for row in rows.into_iter().filter(|r| r.state == state) {
        by_county.entry(row.county.clone()).or_default().push(row);
    }
    if by_county.is_empty() {
        return Err(AppError::new(3, format!("No rows found for state '{state}'.")));
    }

    let mut out = Vec::with_capacity(by_county.len());
    for (county, mut county_rows) in by_county {
        county_rows.sort_by_key(|r| r.date);
        let fips = county_rows[0].fips;
        let label = format!("{county}, {state}");
        let series = match windowed_daily(&county_rows, label, fips, from, to) {
            Ok(s) => s,
            Err(_) => {
                debug!(county = %county, "no rows inside the date window");
                continue;
            }
        };
        let negative_days = series.values.iter().filter(|&&v| v < 0.0).count();
        out.push(CountyIngest {
            series,
            row_errors: Vec::new(),
            rows_read: county_rows.len(),
            negative_days,
        });
    }

    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), total = rows_read, "skipped unparseable CSV rows");
    }

    Ok(out)
}

/// Load a `day,value` CSV (a `cases` column is accepted in place of `value`).
///
/// Rows are ordered by `day`.
pub fn load_daily_series(path: &Path) -> Result<CountyIngest, AppError> {
    let (mut reader, header_map) = open_csv(path)?;

    if !header_map.contains_key("day") {
        return Err(AppError::new(2, "Missing required column: `day`"));
    }
    let value_col = if header_map.contains_key("value") {
        "value"
    } else if header_map.contains_key("cases") {
        "cases"
    } else {
        return Err(AppError::new(2, "Missing required column: `value` (or `cases`)"));
    };

    let mut days: Vec<(i64, f64)> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| {
                let day = get_required(&record, &header_map, "day")?
                    .parse::<i64>()
                    .map_err(|e| format!("Invalid `day`: {e}"))?;
                let value = parse_f64(get_required(&record, &header_map, value_col)?, value_col)?;
                Ok((day, value))
            });
        match parsed {
            Ok(pair) => days.push(pair),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if days.is_empty() {
        return Err(AppError::new(3, "No valid rows in daily series CSV."));
    }
    days.sort_by_key(|&(day, _)| day);

    let values: Vec<f64> = days.into_iter().map(|(_, v)| v).collect();
    let negative_days = values.iter().filter(|&&v| v < 0.0).count();
    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".to_string());

    Ok(CountyIngest {
        series: DailySeries {
            label,
            dates: Vec::new(),
            values,
            fips: None,
        },
        row_errors,
        rows_read,
        negative_days,
    })
}

/// Load a `fips,population` table.
pub fn load_populations(path: &Path) -> Result<HashMap<u32, f64>, AppError> {
    let (mut reader, header_map) = open_csv(path)?;
    for col in ["fips", "population"] {
        if !header_map.contains_key(col) {
            return Err(AppError::new(2, format!("Missing required column: `{col}`")));
        }
    }

    let mut out = HashMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Line {line}: CSV parse error: {e}")))?;
        let fips = parse_fips(get_required(&record, &header_map, "fips").map_err(|e| line_error(line, e))?)
            .map_err(|e| line_error(line, e))?;
        let population = parse_f64(
            get_required(&record, &header_map, "population").map_err(|e| line_error(line, e))?,
            "population",
        )
        .map_err(|e| line_error(line, e))?;
        if population <= 0.0 {
            return Err(line_error(line, format!("population must be > 0, got {population}")));
        }
        out.insert(fips, population);
    }

    Ok(out)
}

fn read_county_rows(path: &Path) -> Result<(Vec<CountyRow>, Vec<RowError>, usize), AppError> {
    let (mut reader, header_map) = open_csv(path)?;
    for col in ["date", "county", "state", "cases"] {
        if !header_map.contains_key(col) {
            return Err(AppError::new(2, format!("Missing required column: `{col}`")));
        }
    }

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_county_row(&record, &header_map) {
            Ok((row, cases_error)) => {
                // A bad count still occupies its day so differencing cannot span two days.
                if let Some(message) = cases_error {
                    row_errors.push(RowError { line, message });
                }
                rows.push(row);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok((rows, row_errors, rows_read))
}

/// Returns the row plus the error for an unparseable `cases` cell, if any.
fn parse_county_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<(CountyRow, Option<String>), String> {
    let date = parse_date(get_required(record, header_map, "date")?)?;
    let county = get_required(record, header_map, "county")?.to_lowercase();
    let state = get_required(record, header_map, "state")?.to_lowercase();
    let fips = get_optional(record, header_map, "fips").map(parse_fips).transpose()?;
    let (cumulative, cases_error) = match get_optional(record, header_map, "cases").map(|s| parse_f64(s, "cases")) {
        Some(Ok(v)) => (Some(v), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    Ok((
        CountyRow {
            date,
            county,
            state,
            fips,
            cumulative,
        },
        cases_error,
    ))
}

/// Difference cumulative counts, then keep `[from, to]`.
///
/// A day is 0 when it has no predecessor or when either its own or the
/// previous cumulative count is missing.
fn windowed_daily(
    rows: &[CountyRow],
    label: String,
    fips: Option<u32>,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> Result<DailySeries, AppError> {
    let mut dates = Vec::new();
    let mut values = Vec::new();

    let mut prev: Option<f64> = None;
    for row in rows {
        let daily = match (prev, row.cumulative) {
            (Some(p), Some(c)) => c - p,
            _ => 0.0,
        };
        prev = row.cumulative;

        let in_window = row.date >= from && to.is_none_or(|t| row.date <= t);
        if in_window {
            dates.push(row.date);
            values.push(daily);
        }
    }

    if values.is_empty() {
        return Err(AppError::new(
            3,
            format!("No rows for '{label}' inside the requested date window."),
        ));
    }

    Ok(DailySeries {
        label,
        dates,
        values,
        fips,
    })
}

fn matches_selector(row: &CountyRow, selector: &CountySelector) -> bool {
    match selector {
        CountySelector::Fips(fips) => row.fips == Some(*fips),
        CountySelector::Name { county, state } => {
            row.county == county.trim().to_lowercase() && row.state == state.trim().to_lowercase()
        }
    }
}

fn describe_selector(selector: &CountySelector) -> String {
    match selector {
        CountySelector::Fips(fips) => format!("fips={fips}"),
        CountySelector::Name { county, state } => format!("county='{county}', state='{state}'"),
    }
}

fn open_csv(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    Ok((reader, header_map))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Strip a UTF-8 BOM on the first header, as some spreadsheet exports add one.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, MM/DD/YYYY, YYYY/MM/DD."
    ))
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    let v = s
        .parse::<f64>()
        .map_err(|e| format!("Invalid `{name}` value '{s}': {e}"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value '{s}'"))
    }
}

/// FIPS codes sometimes arrive as floats (`42003.0`) from spreadsheet round trips.
fn parse_fips(s: &str) -> Result<u32, String> {
    if let Ok(v) = s.parse::<u32>() {
        return Ok(v);
    }
    let v = parse_f64(s, "fips")?;
    if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
        Ok(v as u32)
    } else {
        Err(format!("Invalid `fips` value '{s}'"))
    }
}

fn line_error(line: usize, message: String) -> AppError {
    AppError::new(2, format!("Line {line}: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const COUNTIES: &str = "\
date,county,state,fips,cases,deaths
2021-12-24,Allegheny,Pennsylvania,42003,100,1
2021-12-24,Butler,Pennsylvania,42019,40,0
2021-12-25,Allegheny,Pennsylvania,42003,130,1
2021-12-25,Butler,Pennsylvania,42019,45,0
2021-12-26,Allegheny,Pennsylvania,42003,180,2
2021-12-26,Butler,Pennsylvania,42019,not-a-number,0
2021-12-27,Allegheny,Pennsylvania,42003,175,2
2021-12-26,Cook,Illinois,17031,900,9
";

    #[test]
    fn differencing_happens_before_the_window() {
        let file = write_csv(COUNTIES);
        let selector = CountySelector::Name {
            county: "ALLEGHENY".to_string(),
            state: "pennsylvania".to_string(),
        };
        let ingest = load_county_series(file.path(), &selector, ymd(2021, 12, 25), None).unwrap();

        assert_eq!(ingest.series.values, vec![30.0, 50.0, -5.0]);
        assert_eq!(ingest.series.dates[0], ymd(2021, 12, 25));
        assert_eq!(ingest.series.fips, Some(42003));
        assert_eq!(ingest.negative_days, 1);
        assert_eq!(ingest.row_errors.len(), 1);
        assert_eq!(ingest.row_errors[0].line, 7);
    }

    #[test]
    fn blank_count_zeroes_its_day_and_the_next() {
        let file = write_csv(
            "date,county,state,fips,cases\n\
             2021-01-01,A,B,1,100\n\
             2021-01-02,A,B,1,110\n\
             2021-01-03,A,B,1,\n\
             2021-01-04,A,B,1,130\n\
             2021-01-05,A,B,1,135\n",
        );
        let ingest = load_county_series(file.path(), &CountySelector::Fips(1), ymd(2021, 1, 1), None).unwrap();

        assert_eq!(ingest.series.values, vec![0.0, 10.0, 0.0, 0.0, 5.0]);
        assert_eq!(ingest.negative_days, 0);
        assert!(ingest.row_errors.is_empty());
    }

    #[test]
    fn unparseable_count_keeps_its_day() {
        let file = write_csv(
            "date,county,state,fips,cases\n\
             2021-01-01,A,B,1,100\n\
             2021-01-02,A,B,1,oops\n\
             2021-01-03,A,B,1,130\n",
        );
        let ingest = load_county_series(file.path(), &CountySelector::Fips(1), ymd(2021, 1, 1), None).unwrap();

        assert_eq!(ingest.series.values, vec![0.0, 0.0, 0.0]);
        assert_eq!(ingest.series.dates.len(), 3);
        assert_eq!(ingest.row_errors.len(), 1);
        assert_eq!(ingest.row_errors[0].line, 3);
    }

    #[test]
    fn fips_selector_and_upper_bound() {
        let file = write_csv(COUNTIES);
        let ingest = load_county_series(
            file.path(),
            &CountySelector::Fips(42003),
            ymd(2021, 12, 24),
            Some(ymd(2021, 12, 25)),
        )
        .unwrap();

        assert_eq!(ingest.series.values, vec![0.0, 30.0]);
        assert_eq!(ingest.series.label, "allegheny, pennsylvania");
    }

    #[test]
    fn unknown_county_is_an_error() {
        let file = write_csv(COUNTIES);
        let err = load_county_series(file.path(), &CountySelector::Fips(1), ymd(2021, 1, 1), None).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn state_load_groups_by_county() {
        let file = write_csv(COUNTIES);
        let counties = load_state_counties(file.path(), "Pennsylvania", ymd(2021, 12, 25), None).unwrap();

        let labels: Vec<&str> = counties.iter().map(|c| c.series.label.as_str()).collect();
        assert_eq!(labels, vec!["allegheny, pennsylvania", "butler, pennsylvania"]);
        // Butler's 12-26 count is unparseable, so that day is 0 rather than dropped.
        assert_eq!(counties[1].series.values, vec![5.0, 0.0]);
    }

    #[test]
    fn missing_cases_column_is_rejected() {
        let file = write_csv("date,county,state\n2021-01-01,a,b\n");
        let err = load_county_series(file.path(), &CountySelector::Fips(1), ymd(2021, 1, 1), None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn daily_series_is_sorted_by_day() {
        let file = write_csv("\u{feff}Day,Value\n2,30\n0,10\n1,20\nx,5\n");
        let ingest = load_daily_series(file.path()).unwrap();
        assert_eq!(ingest.series.values, vec![10.0, 20.0, 30.0]);
        assert_eq!(ingest.row_errors.len(), 1);
    }

    #[test]
    fn populations_parse_float_fips() {
        let file = write_csv("fips,population\n42003.0,1250578\n42019,187853\n");
        let pops = load_populations(file.path()).unwrap();
        assert_eq!(pops.get(&42003), Some(&1_250_578.0));
        assert_eq!(pops.len(), 2);
    }
}
