//! Mapped per-unit variables.

use disease_map_geography_models::{BackendColumns, ReportRow};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A per-unit quantity that can be drawn as a choropleth.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum MapVariable {
    /// Raw standardized mortality ratio.
    Rme,
    /// Smoothed risk from the simulation backend.
    SimulationRisk,
    /// Exceedance probability from the simulation backend.
    SimulationProbability,
    /// Smoothed risk from the approximation backend.
    ApproximationRisk,
    /// Exceedance probability from the approximation backend.
    ApproximationProbability,
}

impl MapVariable {
    /// All variables, in report order.
    pub const ALL: &[Self] = &[
        Self::Rme,
        Self::SimulationRisk,
        Self::SimulationProbability,
        Self::ApproximationRisk,
        Self::ApproximationProbability,
    ];

    /// Map title.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rme => "Standardized mortality ratio (RME)",
            Self::SimulationRisk => "Smoothed relative risk (MCMC)",
            Self::SimulationProbability => "P(RR > 1) (MCMC)",
            Self::ApproximationRisk => "Smoothed relative risk (Laplace)",
            Self::ApproximationProbability => "P(RR > 1) (Laplace)",
        }
    }

    /// Value of this variable for `row`, if the backend it comes from ran.
    #[must_use]
    pub fn value(self, row: &ReportRow) -> Option<f64> {
        let risk = |c: Option<BackendColumns>| c.map(|c| c.smoothed_risk);
        let prob = |c: Option<BackendColumns>| c.map(|c| c.prob_exceeds_one);

        match self {
            Self::Rme => Some(row.rme),
            Self::SimulationRisk => risk(row.simulation),
            Self::SimulationProbability => prob(row.simulation),
            Self::ApproximationRisk => risk(row.approximation),
            Self::ApproximationProbability => prob(row.approximation),
        }
    }

    /// Values for every row, or `None` unless every row has one.
    #[must_use]
    pub fn values(self, rows: &[ReportRow]) -> Option<Vec<f64>> {
        rows.iter().map(|row| self.value(row)).collect()
    }

    /// Variables available for `rows`, in report order.
    #[must_use]
    pub fn available(rows: &[ReportRow]) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|v| !rows.is_empty() && rows.iter().all(|row| v.value(row).is_some()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::rows;

    use super::*;

    #[test]
    fn only_backends_that_ran_are_available() {
        assert_eq!(
            MapVariable::available(&rows()),
            vec![
                MapVariable::Rme,
                MapVariable::SimulationRisk,
                MapVariable::SimulationProbability,
            ]
        );
        assert!(MapVariable::available(&[]).is_empty());
    }

    #[test]
    fn values_follow_row_order() {
        let rows = rows();
        assert_eq!(
            MapVariable::SimulationProbability.values(&rows),
            Some(vec![0.0, 0.25, 0.5, 0.75])
        );
        assert_eq!(MapVariable::ApproximationRisk.values(&rows), None);
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(MapVariable::SimulationRisk.to_string(), "simulation_risk");
        assert_eq!(MapVariable::Rme.as_ref(), "rme");
    }
}
