#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! BYM inference backend adapters.
//!
//! The spatial model itself is fitted by external engines. This crate
//! packages the counts, expected counts, and neighbour graph into the shape
//! each engine expects, and normalizes what comes back into one
//! [`ModelResult`] per unit, in input order.
//!
//! Two adapters implement [`RiskModel`]:
//!
//! * [`SimulationAdapter`] drives an MCMC [`Sampler`] and summarizes its
//!   retained draws.
//! * [`ApproximationAdapter`] materializes the graph file and reads
//!   marginal summaries from an [`Approximator`].
//!
//! [`ModelBackend`] is the explicit choice between them.

pub mod approximation;
pub mod command;
pub mod simulation;

use std::path::PathBuf;

use disease_map_model_models::{BackendKind, ModelResult};
use disease_map_spatial::{NeighborGraph, SpatialError};
use thiserror::Error;

pub use approximation::{ApproximationAdapter, ApproximationRequest, Approximator};
pub use command::{CommandApproximator, CommandSampler, CommandSpec};
pub use simulation::{Sampler, SamplerRequest, SimulationAdapter};

/// Errors that can occur while fitting a backend.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Backend settings are invalid. Raised before any backend call.
    #[error("Invalid {backend} configuration: {message}")]
    Config {
        /// Backend the settings belong to.
        backend: BackendKind,
        /// Description of what is wrong.
        message: String,
    },

    /// Backend output does not line up with the input units.
    #[error("Integrity error from {backend} backend: {message}")]
    Integrity {
        /// Backend that produced the output.
        backend: BackendKind,
        /// Description of the mismatch.
        message: String,
    },

    /// The shared model input is inconsistent.
    #[error("Invalid model input: {message}")]
    InvalidInput {
        /// Description of what is wrong.
        message: String,
    },

    /// The backend itself failed.
    #[error("{backend} backend failed: {message}")]
    Backend {
        /// Backend that failed.
        backend: BackendKind,
        /// Description of the failure.
        message: String,
    },

    /// Writing the graph file failed.
    #[error("Graph error: {0}")]
    Graph(#[from] SpatialError),

    /// Reading or writing a backend exchange file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// CSV parsing of backend output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding of a backend request failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The uniform input of every backend: counts, expected counts, and the
/// neighbour graph, all over the same ordered units.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    counts: Vec<u64>,
    exposures: Vec<f64>,
    graph: NeighborGraph,
}

impl ModelInput {
    /// Bundles the model inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidInput`] if the three inputs do not cover the
    /// same number of units or an expected count is negative or not finite.
    pub fn new(
        counts: Vec<u64>,
        exposures: Vec<f64>,
        graph: NeighborGraph,
    ) -> Result<Self, ModelError> {
        if counts.len() != exposures.len() || counts.len() != graph.len() {
            return Err(ModelError::InvalidInput {
                message: format!(
                    "input sizes differ: {} counts, {} exposures, {} graph units",
                    counts.len(),
                    exposures.len(),
                    graph.len()
                ),
            });
        }

        if let Some(bad) = exposures.iter().find(|e| !e.is_finite() || **e < 0.0) {
            return Err(ModelError::InvalidInput {
                message: format!("expected count {bad} must be finite and non-negative"),
            });
        }

        Ok(Self {
            counts,
            exposures,
            graph,
        })
    }

    /// Observed counts.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Expected counts.
    #[must_use]
    pub fn exposures(&self) -> &[f64] {
        &self.exposures
    }

    /// Neighbour graph.
    #[must_use]
    pub const fn graph(&self) -> &NeighborGraph {
        &self.graph
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether there are no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// A fitted BYM backend.
pub trait RiskModel: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Fits the model and returns one result per unit, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the backend fails or its output does not
    /// line up with the input units.
    fn fit(&self, input: &ModelInput) -> Result<Vec<ModelResult>, ModelError>;
}

/// Explicit choice of backend.
pub enum ModelBackend {
    /// MCMC sampler.
    Simulation(SimulationAdapter),
    /// Laplace approximation.
    Approximation(ApproximationAdapter),
}

impl RiskModel for ModelBackend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Simulation(adapter) => adapter.kind(),
            Self::Approximation(adapter) => adapter.kind(),
        }
    }

    fn fit(&self, input: &ModelInput) -> Result<Vec<ModelResult>, ModelError> {
        let results = match self {
            Self::Simulation(adapter) => adapter.fit(input)?,
            Self::Approximation(adapter) => adapter.fit(input)?,
        };
        check_results(self.kind(), &results, input.len())?;
        Ok(results)
    }
}

/// Verifies that a result set covers every unit and holds sane values.
///
/// # Errors
///
/// Returns [`ModelError::Integrity`] if the length differs from
/// `expected_len`, or any value is non-finite, a risk or count is
/// negative, or a probability falls outside `[0, 1]`.
pub fn check_results(
    backend: BackendKind,
    results: &[ModelResult],
    expected_len: usize,
) -> Result<(), ModelError> {
    if results.len() != expected_len {
        return Err(ModelError::Integrity {
            backend,
            message: format!(
                "{} results for {expected_len} input units",
                results.len()
            ),
        });
    }

    for (index, result) in results.iter().enumerate() {
        let ModelResult {
            smoothed_risk,
            prob_exceeds_one,
            predicted_count,
        } = *result;

        let sane = smoothed_risk.is_finite()
            && smoothed_risk >= 0.0
            && (0.0..=1.0).contains(&prob_exceeds_one)
            && predicted_count.is_finite()
            && predicted_count >= 0.0;

        if !sane {
            return Err(ModelError::Integrity {
                backend,
                message: format!("unit {index} has out-of-range result {result:?}"),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(risk: f64, prob: f64) -> ModelResult {
        ModelResult {
            smoothed_risk: risk,
            prob_exceeds_one: prob,
            predicted_count: risk,
        }
    }

    #[test]
    fn short_result_set_is_an_integrity_error() {
        let results = vec![result(1.0, 0.5); 728];
        let err = check_results(BackendKind::Approximation, &results, 729).unwrap_err();
        assert!(matches!(err, ModelError::Integrity { .. }));
        assert!(err.to_string().contains("728 results for 729"));
    }

    #[test]
    fn out_of_range_values_are_integrity_errors() {
        for bad in [result(-1.0, 0.5), result(1.0, 1.5), result(f64::NAN, 0.5)] {
            assert!(check_results(BackendKind::Simulation, &[bad], 1).is_err());
        }
        assert!(check_results(BackendKind::Simulation, &[result(1.2, 1.0)], 1).is_ok());
    }

    #[test]
    fn input_sizes_must_agree() {
        let graph = NeighborGraph::from_adjacency(vec![vec![1], vec![0]]).unwrap();
        assert!(ModelInput::new(vec![1, 2], vec![1.0, 2.0], graph.clone()).is_ok());
        assert!(matches!(
            ModelInput::new(vec![1], vec![1.0, 2.0], graph.clone()),
            Err(ModelError::InvalidInput { .. })
        ));
        assert!(matches!(
            ModelInput::new(vec![1, 2], vec![1.0, -2.0], graph),
            Err(ModelError::InvalidInput { .. })
        ));
    }
}
