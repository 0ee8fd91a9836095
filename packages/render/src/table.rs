//! The per-unit output table.

use std::path::Path;

use disease_map_geography_models::{BackendColumns, ReportRow};
use serde::Serialize;

use crate::RenderError;

/// Flat CSV layout of a [`ReportRow`]. Columns of a backend that did not
/// run are left empty.
#[derive(Debug, Serialize)]
struct UnitRecord<'a> {
    code: &'a str,
    name: &'a str,
    observed: u64,
    expected: f64,
    rme: f64,
    sim_smoothed_risk: Option<f64>,
    sim_prob_exceeds_one: Option<f64>,
    sim_predicted_count: Option<f64>,
    approx_smoothed_risk: Option<f64>,
    approx_prob_exceeds_one: Option<f64>,
    approx_predicted_count: Option<f64>,
}

impl<'a> From<&'a ReportRow> for UnitRecord<'a> {
    fn from(row: &'a ReportRow) -> Self {
        let sim = row.simulation.as_ref();
        let approx = row.approximation.as_ref();
        let risk = |c: Option<&BackendColumns>| c.map(|c| c.smoothed_risk);
        let prob = |c: Option<&BackendColumns>| c.map(|c| c.prob_exceeds_one);
        let predicted = |c: Option<&BackendColumns>| c.map(|c| c.predicted_count);

        Self {
            code: &row.code,
            name: &row.name,
            observed: row.observed,
            expected: row.expected,
            rme: row.rme,
            sim_smoothed_risk: risk(sim),
            sim_prob_exceeds_one: prob(sim),
            sim_predicted_count: predicted(sim),
            approx_smoothed_risk: risk(approx),
            approx_prob_exceeds_one: prob(approx),
            approx_predicted_count: predicted(approx),
        }
    }
}

/// Writes `rows` as CSV to `path`.
///
/// # Errors
///
/// Returns [`RenderError`] if the file cannot be created or written.
pub fn write_units_csv(path: &Path, rows: &[ReportRow]) -> Result<(), RenderError> {
    let file = std::fs::File::create(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_units(file, rows)
}

/// Writes `rows` as CSV to `writer`.
///
/// # Errors
///
/// Returns [`RenderError::Csv`] if serialization fails.
pub fn write_units<W: std::io::Write>(writer: W, rows: &[ReportRow]) -> Result<(), RenderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(UnitRecord::from(row))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
