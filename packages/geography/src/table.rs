//! Mortality table reader.
//!
//! Parses a delimited text table with one row per municipality. Columns are
//! located by header name, so the table may carry any number of extra
//! columns in any order.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use disease_map_geography_models::MortalityRecord;
use serde::{Deserialize, Serialize};

use crate::GeographyError;

/// Header names of the columns the loader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumns {
    /// Municipality code column.
    #[serde(default = "default_code")]
    pub code: String,
    /// Optional municipality name column.
    #[serde(default)]
    pub name: Option<String>,
    /// Observed deaths column.
    #[serde(default = "default_observed")]
    pub observed: String,
    /// Expected deaths column.
    #[serde(default = "default_expected")]
    pub expected: String,
    /// Field delimiter (defaults to `,`).
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_code() -> String {
    "code".to_string()
}

fn default_observed() -> String {
    "O".to_string()
}

fn default_expected() -> String {
    "E".to_string()
}

const fn default_delimiter() -> char {
    ','
}

impl Default for TableColumns {
    fn default() -> Self {
        Self {
            code: default_code(),
            name: None,
            observed: default_observed(),
            expected: default_expected(),
            delimiter: default_delimiter(),
        }
    }
}

/// Reads the mortality table at `path`.
///
/// # Errors
///
/// Returns [`GeographyError`] if the file cannot be opened or its content
/// is malformed.
pub fn read_mortality_csv(
    path: &Path,
    columns: &TableColumns,
) -> Result<Vec<MortalityRecord>, GeographyError> {
    let file = std::fs::File::open(path).map_err(|source| GeographyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_mortality(file, columns)
}

/// Reads mortality records from any reader.
///
/// # Errors
///
/// Returns [`GeographyError`] if a required column is missing, a count is
/// not a non-negative number, or a code appears twice.
pub fn read_mortality<R: Read>(
    reader: R,
    columns: &TableColumns,
) -> Result<Vec<MortalityRecord>, GeographyError> {
    let delimiter = u8::try_from(columns.delimiter).map_err(|_| GeographyError::InvalidValue {
        code: String::new(),
        message: format!("delimiter '{}' is not a single byte", columns.delimiter),
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| GeographyError::MissingColumn {
                column: column.to_string(),
            })
    };

    let code_idx = position(&columns.code)?;
    let observed_idx = position(&columns.observed)?;
    let expected_idx = position(&columns.expected)?;
    let name_idx = columns.name.as_deref().map(position).transpose()?;

    let mut seen = BTreeSet::new();
    let mut records = Vec::new();

    for row in rdr.records() {
        let row = row?;
        let code = row.get(code_idx).unwrap_or_default().to_string();

        if code.is_empty() {
            log::warn!("Skipping mortality row with empty code");
            continue;
        }
        if !seen.insert(code.clone()) {
            return Err(GeographyError::DuplicateCode {
                code,
                input: "mortality table",
            });
        }

        let observed = parse_count(&code, row.get(observed_idx).unwrap_or_default())?;
        let expected = parse_expected(&code, row.get(expected_idx).unwrap_or_default())?;
        let name = name_idx
            .and_then(|idx| row.get(idx))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        records.push(MortalityRecord {
            code,
            name,
            observed,
            expected,
        });
    }

    Ok(records)
}

/// Parses an observed count. Integral floats such as `"12.0"` are accepted
/// since statistical packages often write counts that way.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_count(code: &str, raw: &str) -> Result<u64, GeographyError> {
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }

    let invalid = || GeographyError::InvalidValue {
        code: code.to_string(),
        message: format!("observed count '{raw}' is not a non-negative integer"),
    };

    let value: f64 = raw.parse().map_err(|_| invalid())?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(invalid())
    }
}

fn parse_expected(code: &str, raw: &str) -> Result<f64, GeographyError> {
    let value: f64 = raw.parse().map_err(|_| GeographyError::InvalidValue {
        code: code.to_string(),
        message: format!("expected count '{raw}' is not a number"),
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(GeographyError::InvalidValue {
            code: code.to_string(),
            message: format!("expected count {value} must be finite and non-negative"),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> TableColumns {
        TableColumns {
            code: "CODMUNI".to_string(),
            name: Some("NOMBRE".to_string()),
            ..TableColumns::default()
        }
    }

    #[test]
    fn reads_rows_by_header_name() {
        let csv = "NOMBRE,E,extra,CODMUNI,O\nHuesca,5.5,x, 22125 ,7\nJaca,2,y,22130,0\n";
        let records = read_mortality(csv.as_bytes(), &columns()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "22125");
        assert_eq!(records[0].name.as_deref(), Some("Huesca"));
        assert_eq!(records[0].observed, 7);
        assert!((records[0].expected - 5.5).abs() < f64::EPSILON);
        assert_eq!(records[1].observed, 0);
    }

    #[test]
    fn accepts_integral_float_counts() {
        let csv = "CODMUNI,O,E\n1,12.0,3\n";
        let records = read_mortality(csv.as_bytes(), &columns().clone_without_name()).unwrap();
        assert_eq!(records[0].observed, 12);
    }

    #[test]
    fn rejects_fractional_and_negative_values() {
        let cols = columns().clone_without_name();
        assert!(matches!(
            read_mortality("CODMUNI,O,E\n1,1.5,3\n".as_bytes(), &cols),
            Err(GeographyError::InvalidValue { .. })
        ));
        assert!(matches!(
            read_mortality("CODMUNI,O,E\n1,1,-3\n".as_bytes(), &cols),
            Err(GeographyError::InvalidValue { .. })
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let err = read_mortality("CODMUNI,O\n1,1\n".as_bytes(), &columns().clone_without_name())
            .unwrap_err();
        assert!(matches!(err, GeographyError::MissingColumn { column } if column == "E"));
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let csv = "CODMUNI,O,E\n1,1,1\n1,2,2\n";
        let err = read_mortality(csv.as_bytes(), &columns().clone_without_name()).unwrap_err();
        assert!(matches!(err, GeographyError::DuplicateCode { .. }));
    }

    #[test]
    fn semicolon_delimiter() {
        let cols = TableColumns {
            delimiter: ';',
            ..columns().clone_without_name()
        };
        let records = read_mortality("CODMUNI;O;E\n7;2;4,0\n".as_bytes(), &cols);
        // `4,0` is not a valid number with a `.` decimal separator.
        assert!(records.is_err());

        let records = read_mortality("CODMUNI;O;E\n7;2;4.0\n".as_bytes(), &cols).unwrap();
        assert_eq!(records[0].observed, 2);
    }

    impl TableColumns {
        fn clone_without_name(&self) -> Self {
            Self {
                name: None,
                ..self.clone()
            }
        }
    }
}
