//! The end-to-end report run.

use std::path::PathBuf;
use std::sync::Arc;

use disease_map_classify::{Breakpoints, classify};
use disease_map_geography::SpatialUnit;
use disease_map_geography::risk::compute_rme;
use disease_map_geography_models::{BackendColumns, ReportRow};
use disease_map_model::{
    ApproximationAdapter, Approximator, CommandApproximator, CommandSampler, ModelBackend,
    ModelInput, RiskModel, Sampler, SimulationAdapter,
};
use disease_map_model_models::{BackendKind, ModelResult};
use disease_map_render::{MapLayer, MapVariable, RenderedReport, render_report};
use disease_map_spatial::{GraphSummary, NeighborGraph, build_contiguity_graph};

use crate::ReportError;
use crate::config::ReportConfig;
use crate::progress::ProgressCallback;

/// Inference engines behind the two backends.
///
/// [`Engines::from_config`] runs the external programs named in the
/// configuration; other engines can be supplied directly.
#[derive(Clone, Default)]
pub struct Engines {
    /// MCMC sampler for the simulation backend.
    pub sampler: Option<Arc<dyn Sampler>>,
    /// Laplace engine for the approximation backend.
    pub approximator: Option<Arc<dyn Approximator>>,
}

impl Engines {
    /// Command-line engines for every enabled backend.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Config`] if an enabled backend has no
    /// `command`.
    pub fn from_config(config: &ReportConfig) -> Result<Self, ReportError> {
        let mut engines = Self::default();

        if config.simulation.enabled {
            let command = config
                .simulation
                .command
                .clone()
                .ok_or_else(|| missing_command(BackendKind::Simulation))?;
            engines.sampler = Some(Arc::new(CommandSampler::new(command)));
        }
        if config.approximation.enabled {
            let command = config
                .approximation
                .command
                .clone()
                .ok_or_else(|| missing_command(BackendKind::Approximation))?;
            engines.approximator = Some(Arc::new(CommandApproximator::new(command)));
        }

        Ok(engines)
    }

    /// Builds the adapters of every enabled backend. Settings are
    /// validated here, before any engine runs.
    fn backends(&self, config: &ReportConfig) -> Result<Vec<ModelBackend>, ReportError> {
        let mut backends = Vec::new();

        if config.simulation.enabled {
            let sampler = self
                .sampler
                .clone()
                .ok_or_else(|| missing_command(BackendKind::Simulation))?;
            backends.push(ModelBackend::Simulation(SimulationAdapter::new(
                config.simulation.settings,
                sampler,
            )?));
        }

        if config.approximation.enabled {
            let approximator = self
                .approximator
                .clone()
                .ok_or_else(|| missing_command(BackendKind::Approximation))?;
            let work_dir = config
                .approximation
                .command
                .as_ref()
                .map_or_else(|| config.output.dir.join("approximation"), |c| c.work_dir.clone());
            backends.push(ModelBackend::Approximation(ApproximationAdapter::new(
                config.approximation.settings.clone(),
                work_dir,
                approximator,
            )?));
        }

        Ok(backends)
    }
}

fn missing_command(backend: BackendKind) -> ReportError {
    ReportError::Config {
        message: format!("{backend} backend is enabled but has no command"),
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    /// Joined units.
    pub units: usize,
    /// Neighbour graph statistics.
    pub graph: GraphSummary,
    /// Backends that ran.
    pub backends: Vec<BackendKind>,
    /// Variables mapped.
    pub variables: Vec<MapVariable>,
    /// Per-unit rows, in unit order.
    pub rows: Vec<ReportRow>,
    /// Written graph exchange file.
    pub graph_file: PathBuf,
    /// Written report artifacts.
    pub rendered: RenderedReport,
}

/// Loads and joins the inputs and builds their neighbour graph.
///
/// # Errors
///
/// Returns [`ReportError`] if loading, joining, or graph construction
/// fails.
pub fn load_and_link(config: &ReportConfig) -> Result<(Vec<SpatialUnit>, NeighborGraph), ReportError> {
    let units = disease_map_geography::load(&config.input.load_spec())?;

    let geometries: Vec<_> = units.iter().map(|u| u.geometry.clone()).collect();
    let graph = build_contiguity_graph(&geometries, &config.graph)?;
    log_graph(&units, &graph);

    Ok((units, graph))
}

fn log_graph(units: &[SpatialUnit], graph: &NeighborGraph) {
    let GraphSummary {
        units: count,
        links,
        isolated,
        min_neighbors,
        max_neighbors,
        mean_neighbors,
    } = graph.summary();

    log::info!(
        "Neighbour graph: {count} units, {links} links, neighbours min {min_neighbors} / mean {mean_neighbors:.2} / max {max_neighbors}"
    );
    if isolated > 0 {
        let codes: Vec<&str> = graph
            .isolated()
            .into_iter()
            .map(|i| units[i].code.as_str())
            .collect();
        log::warn!("Isolated units: {}", codes.join(", "));
    }
}

/// Runs the whole report.
///
/// # Errors
///
/// Returns [`ReportError`] from the first failing stage. Configuration
/// errors are raised before any input is read or engine is called, and
/// report artifacts are written only once every earlier stage succeeded.
pub async fn run(
    config: &ReportConfig,
    engines: Engines,
    progress: Arc<dyn ProgressCallback>,
) -> Result<ReportSummary, ReportError> {
    config.validate()?;
    let breakpoints = config.classes.breakpoints()?;
    let backends = engines.backends(config)?;
    let kinds: Vec<BackendKind> = backends.iter().map(RiskModel::kind).collect();

    progress.set_total(5 + kinds.len() as u64);

    progress.set_message("Loading inputs".to_string());
    let (units, graph) = load_and_link(config)?;
    progress.inc(1);

    progress.set_message("Computing RME".to_string());
    let rme = compute_rme(&units, config.policy.zero_expected)?;
    progress.inc(1);

    let input = Arc::new(ModelInput::new(
        units.iter().map(|u| u.observed).collect(),
        units.iter().map(|u| u.expected).collect(),
        graph.clone(),
    )?);
    progress.inc(1);

    let fits = fit_all(backends, &input, config.output.parallel_backends, &progress).await?;

    progress.set_message("Classifying".to_string());
    let rows = report_rows(&units, &rme, &fits);
    let variables = match &config.classes.variables {
        Some(variables) => variables.clone(),
        None => MapVariable::available(&rows),
    };
    let layers = classify_layers(&rows, &variables, &breakpoints, config.theme.label_precision)?;
    progress.inc(1);

    progress.set_message("Rendering".to_string());
    let geometries: Vec<_> = units.iter().map(|u| u.geometry.clone()).collect();
    let rendered = render_report(&config.output.dir, &rows, &geometries, &layers, &config.theme)?;
    let graph_file = config.output.dir.join("graph.txt");
    graph.write_graph_file(&graph_file)?;
    progress.inc(1);

    progress.finish(format!(
        "Report for {} units written to {}",
        units.len(),
        config.output.dir.display()
    ));

    Ok(ReportSummary {
        units: units.len(),
        graph: graph.summary(),
        backends: kinds,
        variables,
        rows,
        graph_file,
        rendered,
    })
}

/// Fits every backend on a blocking task, one after another or all at once.
async fn fit_all(
    backends: Vec<ModelBackend>,
    input: &Arc<ModelInput>,
    parallel: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<(BackendKind, Vec<ModelResult>)>, ReportError> {
    let spawn = |backend: ModelBackend| {
        let input = Arc::clone(input);
        tokio::task::spawn_blocking(move || {
            let kind = backend.kind();
            log::info!("Fitting {}", kind.label());
            backend.fit(&input).map(|results| (kind, results))
        })
    };

    let mut fits = Vec::with_capacity(backends.len());

    if parallel {
        progress.set_message("Fitting backends".to_string());
        let handles: Vec<_> = backends.into_iter().map(spawn).collect();
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await);
            progress.inc(1);
        }
        // Every task has finished before the first failure is reported.
        for outcome in outcomes {
            fits.push(outcome??);
        }
    } else {
        for backend in backends {
            progress.set_message(format!("Fitting {}", backend.kind().label()));
            fits.push(spawn(backend).await??);
            progress.inc(1);
        }
    }

    Ok(fits)
}

fn report_rows(
    units: &[SpatialUnit],
    rme: &[f64],
    fits: &[(BackendKind, Vec<ModelResult>)],
) -> Vec<ReportRow> {
    let columns = |kind: BackendKind, index: usize| {
        fits.iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, results)| {
                let r = results[index];
                BackendColumns {
                    smoothed_risk: r.smoothed_risk,
                    prob_exceeds_one: r.prob_exceeds_one,
                    predicted_count: r.predicted_count,
                }
            })
    };

    units
        .iter()
        .zip(rme)
        .enumerate()
        .map(|(index, (unit, &rme))| ReportRow {
            code: unit.code.clone(),
            name: unit.name.clone().unwrap_or_default(),
            observed: unit.observed,
            expected: unit.expected,
            rme,
            simulation: columns(BackendKind::Simulation, index),
            approximation: columns(BackendKind::Approximation, index),
        })
        .collect()
}

fn classify_layers(
    rows: &[ReportRow],
    variables: &[MapVariable],
    breakpoints: &Breakpoints,
    precision: usize,
) -> Result<Vec<MapLayer>, ReportError> {
    variables
        .iter()
        .map(|&variable| {
            let values = variable.values(rows).ok_or_else(|| ReportError::Config {
                message: format!("{variable} is not available for this run"),
            })?;
            let classification = classify(&values, breakpoints)?;
            log::debug!(
                "{variable}: cuts {:?}, counts {:?}",
                classification.cuts,
                classification.counts
            );
            let labels = classification.labels(precision);
            Ok(MapLayer {
                variable,
                classification,
                labels,
            })
        })
        .collect()
}
