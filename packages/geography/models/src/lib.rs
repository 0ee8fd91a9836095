#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Municipal mortality record and report row types.
//!
//! These types describe a single spatial unit (a municipality) as it moves
//! through the pipeline: the raw observed/expected counts read from the
//! tabular input, and the flattened per-unit row that the renderer
//! consumes once both inference backends have run.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Observed and expected death counts for one municipality, as read from
/// the tabular input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MortalityRecord {
    /// Municipality code (join key, trimmed).
    pub code: String,
    /// Human-readable municipality name, when the input carries one.
    pub name: Option<String>,
    /// Observed death count (O).
    pub observed: u64,
    /// Expected death count (E) from indirect standardization.
    pub expected: f64,
}

/// How a unit with zero observed and zero expected deaths is handled when
/// computing its standardized mortality ratio.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZeroExpectedPolicy {
    /// `0 / 0` is defined as a ratio of zero.
    #[default]
    Zero,
    /// `0 / 0` is treated like any other division by zero.
    Reject,
}

/// How municipality codes from the two inputs are compared.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodeMatching {
    /// Exact match on the trimmed code text.
    #[default]
    Exact,
    /// Codes are parsed as integers, so `"04001"` and `"4001"` match.
    Numeric,
}

/// Per-backend posterior summary columns of a [`ReportRow`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendColumns {
    /// Smoothed relative risk (RMS).
    pub smoothed_risk: f64,
    /// Posterior probability that the relative risk exceeds 1.
    pub prob_exceeds_one: f64,
    /// Fitted (predicted) death count.
    pub predicted_count: f64,
}

/// One row of the per-unit output table.
///
/// This is the contract between the pipeline and the renderer: everything
/// drawn on a map or written to the output table comes from these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    /// Municipality code.
    pub code: String,
    /// Municipality name (empty when unknown).
    pub name: String,
    /// Observed death count.
    pub observed: u64,
    /// Expected death count.
    pub expected: f64,
    /// Raw standardized mortality ratio.
    pub rme: f64,
    /// Simulation-backend summary, if that backend ran.
    pub simulation: Option<BackendColumns>,
    /// Approximation-backend summary, if that backend ran.
    pub approximation: Option<BackendColumns>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn policy_parses_from_snake_case() {
        assert_eq!(
            ZeroExpectedPolicy::from_str("reject").ok(),
            Some(ZeroExpectedPolicy::Reject)
        );
        assert_eq!(ZeroExpectedPolicy::default().as_ref(), "zero");
    }

    #[test]
    fn code_matching_display() {
        assert_eq!(CodeMatching::Numeric.to_string(), "numeric");
        assert_eq!(CodeMatching::default(), CodeMatching::Exact);
    }
}
