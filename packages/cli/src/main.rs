#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `disease_map` command-line tool.
//!
//! Runs the disease-mapping report described by a `report.toml`, checks a
//! configuration without running it, or writes the neighbour graph alone.
//! Without a subcommand it asks what to do interactively.
//!
//! Uses `indicatif-log-bridge` (via [`disease_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "disease_map", about = "Small-area disease mapping report")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full report
    Run {
        /// Report configuration file
        #[arg(short, long, default_value = "report.toml")]
        config: PathBuf,
        /// Override the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fit the two backends concurrently
        #[arg(long)]
        parallel: bool,
    },
    /// Validate a configuration without reading inputs or running backends
    Check {
        /// Report configuration file
        #[arg(short, long, default_value = "report.toml")]
        config: PathBuf,
    },
    /// Build the neighbour graph and write it in exchange format
    Graph {
        /// Report configuration file
        #[arg(short, long, default_value = "report.toml")]
        config: PathBuf,
        /// Graph file to write
        #[arg(short, long, default_value = "graph.txt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = disease_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Run {
            config,
            output,
            parallel,
        }) => commands::run(&multi, &config, output, parallel).await,
        Some(Commands::Check { config }) => commands::check(&config),
        Some(Commands::Graph { config, output }) => commands::graph(&config, &output),
        None => return interactive::run(&multi).await,
    };

    if let Err(e) = &result {
        log::error!("{} error: {e}", e.category());
    }
    result.map_err(Into::into)
}
