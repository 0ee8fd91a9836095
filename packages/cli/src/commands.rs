//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::time::Instant;

use disease_map_cli_utils::{IndicatifProgress, MultiProgress};
use disease_map_report::pipeline::load_and_link;
use disease_map_report::{Engines, ReportConfig, ReportError};

/// Runs the full report.
///
/// # Errors
///
/// Returns [`ReportError`] if the configuration is invalid or any pipeline
/// stage fails.
pub async fn run(
    multi: &MultiProgress,
    config_path: &Path,
    output: Option<PathBuf>,
    parallel: bool,
) -> Result<(), ReportError> {
    let start = Instant::now();

    let mut config = ReportConfig::load(config_path)?;
    if let Some(dir) = output {
        config.output.dir = dir;
    }
    if parallel {
        config.output.parallel_backends = true;
    }

    let engines = Engines::from_config(&config)?;
    let progress = IndicatifProgress::stages_bar(multi, "Preparing report");
    let summary = disease_map_report::run(&config, engines, progress).await?;

    log::info!(
        "Report finished in {:.1}s",
        start.elapsed().as_secs_f64()
    );

    println!();
    println!("Units:      {}", summary.units);
    println!(
        "Graph:      {} links, {} isolated",
        summary.graph.links, summary.graph.isolated
    );
    let backends: Vec<&str> = summary.backends.iter().map(|b| b.label()).collect();
    println!("Backends:   {}", backends.join(", "));
    println!("Report:     {}", summary.rendered.html.display());
    println!("Table:      {}", summary.rendered.units_csv.display());
    println!("Graph file: {}", summary.graph_file.display());

    Ok(())
}

/// Loads and validates a configuration.
///
/// # Errors
///
/// Returns [`ReportError`] describing the first problem found.
pub fn check(config_path: &Path) -> Result<(), ReportError> {
    let config = ReportConfig::load(config_path)?;
    config.validate()?;
    Engines::from_config(&config)?;

    let backends: Vec<&str> = config
        .enabled_backends()
        .iter()
        .map(|b| b.label())
        .collect();

    println!("{} is valid", config_path.display());
    println!("  table:    {}", config.input.table.display());
    println!("  geometry: {}", config.input.geometry.display());
    println!("  graph:    {} contiguity", config.graph.rule);
    println!("  backends: {}", backends.join(", "));
    println!("  output:   {}", config.output.dir.display());

    Ok(())
}

/// Builds the neighbour graph and writes it to `output`.
///
/// # Errors
///
/// Returns [`ReportError`] if loading, graph construction, or writing
/// fails.
pub fn graph(config_path: &Path, output: &Path) -> Result<(), ReportError> {
    let config = ReportConfig::load(config_path)?;
    let (units, graph) = load_and_link(&config)?;
    graph.write_graph_file(output)?;

    println!(
        "Wrote neighbour graph of {} units ({} links) to {}",
        units.len(),
        graph.link_count(),
        output.display()
    );

    Ok(())
}
