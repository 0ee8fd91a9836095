#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Inference backend settings and posterior summary types.
//!
//! Both BYM backends consume the same counts and neighbour graph and
//! produce one [`ModelResult`] per unit. The settings types here are what
//! the report configuration deserializes into; validation happens when an
//! adapter is constructed.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which inference backend produced a result.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    /// MCMC sampler (stochastic).
    Simulation,
    /// Laplace-approximation engine (deterministic).
    Approximation,
}

impl BackendKind {
    /// All backends, in report order.
    pub const ALL: &[Self] = &[Self::Simulation, Self::Approximation];

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Simulation => "MCMC (simulation)",
            Self::Approximation => "Laplace approximation",
        }
    }
}

/// Posterior summary for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResult {
    /// Smoothed relative risk (posterior mean).
    pub smoothed_risk: f64,
    /// Posterior probability that the relative risk exceeds 1.
    pub prob_exceeds_one: f64,
    /// Predicted death count.
    pub predicted_count: f64,
}

/// Settings of the simulation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSettings {
    /// Random seed passed to the sampler.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Total iterations per chain, burn-in included.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Initial iterations discarded per chain.
    #[serde(default = "default_burn_in")]
    pub burn_in: usize,
    /// Keep every `thin`-th iteration after burn-in.
    #[serde(default = "default_thin")]
    pub thin: usize,
    /// Number of independent chains.
    #[serde(default = "default_chains")]
    pub chains: usize,
}

const fn default_seed() -> u64 {
    1234
}

const fn default_iterations() -> usize {
    20_000
}

const fn default_burn_in() -> usize {
    2_000
}

const fn default_thin() -> usize {
    10
}

const fn default_chains() -> usize {
    3
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            iterations: default_iterations(),
            burn_in: default_burn_in(),
            thin: default_thin(),
            chains: default_chains(),
        }
    }
}

impl SimulationSettings {
    /// Number of draws each chain keeps after burn-in and thinning.
    ///
    /// Only meaningful for settings where `iterations > burn_in` and
    /// `thin >= 1`; returns 0 otherwise.
    #[must_use]
    pub const fn retained_per_chain(&self) -> usize {
        if self.thin == 0 || self.iterations <= self.burn_in {
            return 0;
        }
        (self.iterations - self.burn_in).div_ceil(self.thin)
    }
}

/// Settings of the approximation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproximationSettings {
    /// File name of the materialized graph inside the work directory.
    #[serde(default = "default_graph_file")]
    pub graph_file: String,
}

fn default_graph_file() -> String {
    "graph.txt".to_string()
}

impl Default for ApproximationSettings {
    fn default() -> Self {
        Self {
            graph_file: default_graph_file(),
        }
    }
}

/// Per-unit marginal summary reported by the approximation backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginalSummary {
    /// Posterior mean of the fitted rate.
    pub mean: f64,
    /// Posterior CDF of the rate evaluated at 1.
    pub cdf_at_one: f64,
    /// Fitted (predicted) count.
    pub fitted: f64,
}

/// Retained draws of one sampler chain: one row per retained iteration,
/// one column per unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Draw rows.
    pub draws: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retained_draws() {
        let settings = SimulationSettings {
            iterations: 100,
            burn_in: 10,
            thin: 10,
            ..SimulationSettings::default()
        };
        assert_eq!(settings.retained_per_chain(), 9);

        let uneven = SimulationSettings {
            iterations: 101,
            ..settings
        };
        assert_eq!(uneven.retained_per_chain(), 10);
    }

    #[test]
    fn retained_draws_for_invalid_settings() {
        let settings = SimulationSettings {
            iterations: 100,
            burn_in: 150,
            ..SimulationSettings::default()
        };
        assert_eq!(settings.retained_per_chain(), 0);
    }

    #[test]
    fn backend_kind_strings() {
        assert_eq!(BackendKind::Simulation.to_string(), "simulation");
        assert_eq!(BackendKind::Approximation.as_ref(), "approximation");
        assert_eq!(BackendKind::ALL.len(), 2);
    }
}
