//! Inner join of mortality records and boundaries on municipality code.

use std::collections::{BTreeMap, BTreeSet};

use disease_map_geography_models::{CodeMatching, MortalityRecord};

use crate::boundaries::Boundary;
use crate::{GeographyError, SpatialUnit};

/// Normalizes a code for comparison under the given matching mode.
///
/// In [`CodeMatching::Numeric`] mode, codes that do not parse as integers
/// fall back to exact text comparison.
#[must_use]
pub fn join_key(code: &str, matching: CodeMatching) -> String {
    let code = code.trim();
    match matching {
        CodeMatching::Exact => code.to_string(),
        CodeMatching::Numeric => code
            .parse::<u64>()
            .map_or_else(|_| code.to_string(), |n| n.to_string()),
    }
}

/// Joins records to boundaries, keeping only codes present in both.
///
/// The result follows the boundary order. The record's name wins over the
/// boundary's name when both are present.
///
/// # Errors
///
/// Returns [`GeographyError::DuplicateCode`] if two records or two
/// boundaries collapse to the same key under `matching`, or [`GeographyError::EmptyJoin`] if nothing
/// matches.
pub fn inner_join(
    records: Vec<MortalityRecord>,
    boundaries: Vec<Boundary>,
    matching: CodeMatching,
) -> Result<Vec<SpatialUnit>, GeographyError> {
    let mut by_key = BTreeMap::new();
    for record in records {
        let key = join_key(&record.code, matching);
        if let Some(previous) = by_key.insert(key, record) {
            return Err(GeographyError::DuplicateCode {
                code: previous.code,
                input: "mortality table",
            });
        }
    }

    let total_boundaries = boundaries.len();
    let mut units = Vec::with_capacity(total_boundaries.min(by_key.len()));
    let mut unmatched_boundaries = 0usize;
    let mut seen = BTreeSet::new();

    for boundary in boundaries {
        let key = join_key(&boundary.code, matching);
        if !seen.insert(key.clone()) {
            return Err(GeographyError::DuplicateCode {
                code: boundary.code,
                input: "geometry layer",
            });
        }
        let Some(record) = by_key.remove(&key) else {
            unmatched_boundaries += 1;
            log::debug!("Boundary {} has no mortality record", boundary.code);
            continue;
        };

        units.push(SpatialUnit {
            code: boundary.code,
            name: record.name.or(boundary.name),
            geometry: boundary.geometry,
            observed: record.observed,
            expected: record.expected,
        });
    }

    if unmatched_boundaries > 0 {
        log::warn!("Dropped {unmatched_boundaries} boundaries without a mortality record");
    }
    if !by_key.is_empty() {
        log::warn!(
            "Dropped {} mortality records without a boundary (e.g. {})",
            by_key.len(),
            by_key.values().next().map_or("", |r| r.code.as_str())
        );
    }

    if units.is_empty() {
        return Err(GeographyError::EmptyJoin);
    }

    log::info!("Joined {} of {total_boundaries} boundaries", units.len());

    Ok(units)
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    fn record(code: &str, observed: u64) -> MortalityRecord {
        MortalityRecord {
            code: code.to_string(),
            name: None,
            observed,
            expected: 1.0,
        }
    }

    fn boundary(code: &str, name: Option<&str>) -> Boundary {
        Boundary {
            code: code.to_string(),
            name: name.map(str::to_string),
            geometry: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
            ]]),
        }
    }

    #[test]
    fn keeps_boundary_order_and_drops_unmatched() {
        let records = vec![record("3", 30), record("1", 10), record("9", 90)];
        let boundaries = vec![boundary("1", Some("Uno")), boundary("2", None), boundary("3", None)];

        let units = inner_join(records, boundaries, CodeMatching::Exact).unwrap();
        let codes: Vec<&str> = units.iter().map(|u| u.code.as_str()).collect();

        assert_eq!(codes, vec!["1", "3"]);
        assert_eq!(units[0].observed, 10);
        assert_eq!(units[0].name.as_deref(), Some("Uno"));
        assert_eq!(units[1].observed, 30);
    }

    #[test]
    fn numeric_matching_ignores_leading_zeros() {
        let units = inner_join(
            vec![record("04001", 4)],
            vec![boundary("4001", None)],
            CodeMatching::Numeric,
        )
        .unwrap();
        assert_eq!(units.len(), 1);

        let err = inner_join(
            vec![record("04001", 4)],
            vec![boundary("4001", None)],
            CodeMatching::Exact,
        )
        .unwrap_err();
        assert!(matches!(err, GeographyError::EmptyJoin));
    }

    #[test]
    fn numeric_collisions_are_duplicates() {
        let err = inner_join(
            vec![record("01", 1), record("1", 2)],
            vec![boundary("1", None)],
            CodeMatching::Numeric,
        )
        .unwrap_err();
        assert!(matches!(err, GeographyError::DuplicateCode { .. }));
    }

    #[test]
    fn numeric_boundary_collisions_are_duplicates() {
        let err = inner_join(
            vec![record("1", 1)],
            vec![boundary("01", None), boundary("1", None)],
            CodeMatching::Numeric,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GeographyError::DuplicateCode {
                input: "geometry layer",
                ..
            }
        ));
    }
}
