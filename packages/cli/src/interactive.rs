//! Interactive mode.
//!
//! Asks which action to take and for the paths it needs, then delegates to
//! [`crate::commands`].

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use disease_map_cli_utils::MultiProgress;

use crate::commands;

enum Action {
    Run,
    Check,
    Graph,
}

impl Action {
    const ALL: &[Self] = &[Self::Run, Self::Check, Self::Graph];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Run => "Run report",
            Self::Check => "Check configuration",
            Self::Graph => "Write neighbour graph",
        }
    }
}

/// Prompts for an action and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the chosen action fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Disease Map Report");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    let config: String = Input::new()
        .with_prompt("Report configuration")
        .default("report.toml".to_string())
        .interact_text()?;
    let config = PathBuf::from(config);

    let result = match Action::ALL[idx] {
        Action::Run => {
            let parallel = Confirm::new()
                .with_prompt("Fit both backends concurrently?")
                .default(false)
                .interact()?;
            commands::run(multi, &config, None, parallel).await
        }
        Action::Check => commands::check(&config),
        Action::Graph => {
            let output: String = Input::new()
                .with_prompt("Graph file")
                .default("graph.txt".to_string())
                .interact_text()?;
            commands::graph(&config, &PathBuf::from(output))
        }
    };

    if let Err(e) = &result {
        log::error!("{} error: {e}", e.category());
    }
    result.map_err(Into::into)
}
