//! Deterministic approximation (Laplace) backend adapter.
//!
//! The approximation engine reads the neighbour graph from a file, so the
//! adapter writes the graph file into its work directory before every fit
//! and hands the engine its path together with the counts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use disease_map_model_models::{
    ApproximationSettings, BackendKind, MarginalSummary, ModelResult,
};
use serde::Serialize;

use crate::{ModelError, ModelInput, RiskModel, check_results};

/// Everything the approximation engine needs for one fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApproximationRequest {
    /// Observed counts.
    pub counts: Vec<u64>,
    /// Expected counts.
    pub exposures: Vec<f64>,
    /// Path of the materialized graph file.
    pub graph_file: PathBuf,
}

/// A deterministic approximate-inference engine for the BYM model.
pub trait Approximator: Send + Sync {
    /// Fits the model and returns one marginal summary per unit.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the engine fails.
    fn approximate(
        &self,
        request: &ApproximationRequest,
    ) -> Result<Vec<MarginalSummary>, ModelError>;
}

/// [`RiskModel`] backed by an [`Approximator`].
pub struct ApproximationAdapter {
    settings: ApproximationSettings,
    work_dir: PathBuf,
    approximator: Arc<dyn Approximator>,
}

impl ApproximationAdapter {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the graph file name is empty or
    /// contains a path separator.
    pub fn new(
        settings: ApproximationSettings,
        work_dir: impl Into<PathBuf>,
        approximator: Arc<dyn Approximator>,
    ) -> Result<Self, ModelError> {
        let name = settings.graph_file.trim();
        if name.is_empty() || Path::new(name).components().count() != 1 {
            return Err(ModelError::Config {
                backend: BackendKind::Approximation,
                message: format!("graph_file '{}' must be a plain file name", settings.graph_file),
            });
        }

        Ok(Self {
            settings,
            work_dir: work_dir.into(),
            approximator,
        })
    }

    /// Where the graph file is written.
    #[must_use]
    pub fn graph_path(&self) -> PathBuf {
        self.work_dir.join(self.settings.graph_file.trim())
    }
}

impl RiskModel for ApproximationAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Approximation
    }

    fn fit(&self, input: &ModelInput) -> Result<Vec<ModelResult>, ModelError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|source| ModelError::Io {
            path: self.work_dir.clone(),
            source,
        })?;

        let graph_file = self.graph_path();
        input.graph().write_graph_file(&graph_file)?;

        let request = ApproximationRequest {
            counts: input.counts().to_vec(),
            exposures: input.exposures().to_vec(),
            graph_file,
        };

        log::info!(
            "Approximating {} units with graph file {}",
            input.len(),
            request.graph_file.display()
        );

        let marginals = self.approximator.approximate(&request)?;
        let results = summarize_marginals(&marginals, input.len())?;
        check_results(BackendKind::Approximation, &results, input.len())?;

        Ok(results)
    }
}

/// Converts marginal summaries into results.
///
/// `prob_exceeds_one` is `1 - cdf_at_one`.
///
/// # Errors
///
/// Returns [`ModelError::Integrity`] if the number of summaries differs
/// from `units` or a CDF value lies outside `[0, 1]`.
pub fn summarize_marginals(
    marginals: &[MarginalSummary],
    units: usize,
) -> Result<Vec<ModelResult>, ModelError> {
    if marginals.len() != units {
        return Err(ModelError::Integrity {
            backend: BackendKind::Approximation,
            message: format!("{} marginals for {units} input units", marginals.len()),
        });
    }

    marginals
        .iter()
        .enumerate()
        .map(|(unit, m)| {
            if !(0.0..=1.0).contains(&m.cdf_at_one) {
                return Err(ModelError::Integrity {
                    backend: BackendKind::Approximation,
                    message: format!("unit {unit} has CDF value {} outside [0, 1]", m.cdf_at_one),
                });
            }
            Ok(ModelResult {
                smoothed_risk: m.mean,
                prob_exceeds_one: 1.0 - m.cdf_at_one,
                predicted_count: m.fitted,
            })
        })
        .collect()
}
