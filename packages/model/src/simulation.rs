//! Simulation (MCMC) backend adapter.
//!
//! The sampler receives the counts, the expected counts, the flattened
//! adjacency, and the run settings, and returns every iteration of the
//! per-unit relative risk for every chain. The adapter drops the burn-in,
//! keeps every `thin`-th draw after it, pools the chains, and reduces each
//! unit's retained draws to a posterior mean and an exceedance probability.

use std::sync::Arc;

use disease_map_model_models::{BackendKind, Chain, ModelResult, SimulationSettings};
use disease_map_spatial::FlatAdjacency;
use serde::Serialize;

use crate::{ModelError, ModelInput, RiskModel, check_results};

/// Everything an MCMC sampler needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerRequest {
    /// Observed counts.
    pub counts: Vec<u64>,
    /// Expected counts.
    pub exposures: Vec<f64>,
    /// Flattened neighbour graph.
    pub adjacency: FlatAdjacency,
    /// Random seed.
    pub seed: u64,
    /// Iterations per chain, burn-in included.
    pub iterations: usize,
    /// Iterations discarded per chain.
    pub burn_in: usize,
    /// Thinning interval.
    pub thin: usize,
    /// Number of chains.
    pub chains: usize,
}

/// An MCMC sampler for the BYM model.
pub trait Sampler: Send + Sync {
    /// Runs the sampler and returns all `iterations` draws of each chain.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the sampler fails.
    fn sample(&self, request: &SamplerRequest) -> Result<Vec<Chain>, ModelError>;
}

/// [`RiskModel`] backed by a [`Sampler`].
pub struct SimulationAdapter {
    settings: SimulationSettings,
    sampler: Arc<dyn Sampler>,
}

impl SimulationAdapter {
    /// Creates the adapter after validating its settings.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] unless `iterations > burn_in`,
    /// `thin >= 1`, and `chains >= 1`.
    pub fn new(
        settings: SimulationSettings,
        sampler: Arc<dyn Sampler>,
    ) -> Result<Self, ModelError> {
        validate(&settings)?;
        Ok(Self { settings, sampler })
    }

    /// The validated settings.
    #[must_use]
    pub const fn settings(&self) -> &SimulationSettings {
        &self.settings
    }
}

/// Checks simulation settings without constructing an adapter.
///
/// # Errors
///
/// Returns [`ModelError::Config`] describing the first violated rule.
pub fn validate(settings: &SimulationSettings) -> Result<(), ModelError> {
    let fail = |message: String| {
        Err(ModelError::Config {
            backend: BackendKind::Simulation,
            message,
        })
    };

    if settings.iterations <= settings.burn_in {
        return fail(format!(
            "iterations ({}) must exceed burn-in ({})",
            settings.iterations, settings.burn_in
        ));
    }
    if settings.thin < 1 {
        return fail(format!("thin ({}) must be at least 1", settings.thin));
    }
    if settings.chains < 1 {
        return fail(format!("chains ({}) must be at least 1", settings.chains));
    }

    Ok(())
}

impl RiskModel for SimulationAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulation
    }

    fn fit(&self, input: &ModelInput) -> Result<Vec<ModelResult>, ModelError> {
        let request = SamplerRequest {
            counts: input.counts().to_vec(),
            exposures: input.exposures().to_vec(),
            adjacency: input.graph().to_flat(),
            seed: self.settings.seed,
            iterations: self.settings.iterations,
            burn_in: self.settings.burn_in,
            thin: self.settings.thin,
            chains: self.settings.chains,
        };

        log::info!(
            "Sampling {} units: {} chain(s) x {} iterations (burn-in {}, thin {}, seed {})",
            input.len(),
            request.chains,
            request.iterations,
            request.burn_in,
            request.thin,
            request.seed
        );

        let chains = self.sampler.sample(&request)?;
        let results = summarize_chains(&self.settings, &chains, input.exposures())?;
        check_results(BackendKind::Simulation, &results, input.len())?;

        Ok(results)
    }
}

/// Drops burn-in, thins, and pools the draws of all chains into per-unit
/// summaries.
///
/// # Errors
///
/// Returns [`ModelError::Integrity`] if the chain count, draws per chain,
/// or draw width disagree with the settings and `exposures`, or a retained
/// draw is not a positive finite number. Returns [`ModelError::Config`] if
/// the settings themselves are invalid.
#[allow(clippy::cast_precision_loss)]
pub fn summarize_chains(
    settings: &SimulationSettings,
    chains: &[Chain],
    exposures: &[f64],
) -> Result<Vec<ModelResult>, ModelError> {
    validate(settings)?;

    let integrity = |message: String| ModelError::Integrity {
        backend: BackendKind::Simulation,
        message,
    };

    if chains.len() != settings.chains {
        return Err(integrity(format!(
            "{} chains returned, {} requested",
            chains.len(),
            settings.chains
        )));
    }

    let retained = settings.retained_per_chain();
    let units = exposures.len();
    let mut sums = vec![0.0; units];
    let mut above_one = vec![0usize; units];

    for (c, chain) in chains.iter().enumerate() {
        if chain.draws.len() != settings.iterations {
            return Err(integrity(format!(
                "chain {c} has {} draws, expected {}",
                chain.draws.len(),
                settings.iterations
            )));
        }

        if let Some((d, draw)) = chain.draws.iter().enumerate().find(|(_, d)| d.len() != units) {
            return Err(integrity(format!(
                "chain {c} draw {d} covers {} units, expected {units}",
                draw.len()
            )));
        }

        for (d, draw) in chain
            .draws
            .iter()
            .enumerate()
            .skip(settings.burn_in)
            .step_by(settings.thin)
        {
            for (unit, &value) in draw.iter().enumerate() {
                if !value.is_finite() || value <= 0.0 {
                    return Err(integrity(format!(
                        "chain {c} draw {d} unit {unit} has non-positive effect {value}"
                    )));
                }
                sums[unit] += value;
                if value > 1.0 {
                    above_one[unit] += 1;
                }
            }
        }
    }

    let total = (retained * chains.len()) as f64;

    Ok(sums
        .iter()
        .zip(&above_one)
        .zip(exposures)
        .map(|((&sum, &above), &expected)| {
            let smoothed_risk = sum / total;
            ModelResult {
                smoothed_risk,
                prob_exceeds_one: above as f64 / total,
                predicted_count: expected * smoothed_risk,
            }
        })
        .collect())
}
