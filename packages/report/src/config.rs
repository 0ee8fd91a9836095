//! `report.toml` configuration.
//!
//! ```toml
//! [input]
//! table = "data/ihd_deaths.csv"
//! geometry = "data/municipalities.geojson"
//! matching = "numeric"
//!
//! [input.columns]
//! code = "CODMUNI"
//! observed = "O"
//! expected = "E"
//!
//! [input.properties]
//! code = "CODIGOINE"
//! name = "NAMEUNIT"
//!
//! [graph]
//! rule = "queen"
//! isolated = "allow"
//!
//! [policy]
//! zero_expected = "zero"
//!
//! [simulation.command]
//! program = "Rscript"
//! args = ["scripts/bym_mcmc.R"]
//! work_dir = "work/simulation"
//!
//! [simulation.settings]
//! seed = 1234
//! iterations = 20000
//! burn_in = 2000
//! thin = 10
//!
//! [approximation.command]
//! program = "Rscript"
//! args = ["scripts/bym_laplace.R"]
//! work_dir = "work/approximation"
//!
//! [classes]
//! breakpoints = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0]
//!
//! [output]
//! dir = "report"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::path::{Path, PathBuf};

use disease_map_classify::Breakpoints;
use disease_map_geography::LoadSpec;
use disease_map_geography::boundaries::FeatureProperties;
use disease_map_geography::table::TableColumns;
use disease_map_geography_models::{CodeMatching, ZeroExpectedPolicy};
use disease_map_model::CommandSpec;
use disease_map_model_models::{ApproximationSettings, BackendKind, SimulationSettings};
use disease_map_render::{MapTheme, MapVariable};
use disease_map_spatial::ContiguityOptions;
use serde::{Deserialize, Serialize};

use crate::ReportError;

/// Whole report configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Input files and how to read them.
    pub input: InputConfig,
    /// Neighbour graph construction.
    #[serde(default)]
    pub graph: ContiguityOptions,
    /// Risk policies.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Simulation backend.
    #[serde(default)]
    pub simulation: BackendConfig<SimulationSettings>,
    /// Approximation backend.
    #[serde(default)]
    pub approximation: BackendConfig<ApproximationSettings>,
    /// Map classes.
    #[serde(default)]
    pub classes: ClassesConfig,
    /// Map presentation.
    #[serde(default)]
    pub theme: MapTheme,
    /// Output location.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[input]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Mortality CSV.
    pub table: PathBuf,
    /// Municipality `GeoJSON`.
    pub geometry: PathBuf,
    /// Code comparison between the two inputs.
    #[serde(default)]
    pub matching: CodeMatching,
    /// Table column names.
    #[serde(default)]
    pub columns: TableColumns,
    /// Feature property names.
    #[serde(default)]
    pub properties: FeatureProperties,
}

impl InputConfig {
    /// Loader arguments for this section.
    #[must_use]
    pub fn load_spec(&self) -> LoadSpec {
        LoadSpec {
            table_path: self.table.clone(),
            table: self.columns.clone(),
            geometry_path: self.geometry.clone(),
            geometry: self.properties.clone(),
            matching: self.matching,
        }
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Handling of units with `O = 0` and `E = 0`.
    #[serde(default)]
    pub zero_expected: ZeroExpectedPolicy,
}

/// `[simulation]` / `[approximation]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    deny_unknown_fields,
    bound(deserialize = "S: Deserialize<'de> + Default")
)]
pub struct BackendConfig<S> {
    /// Whether the backend runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// External program running the engine. Required when enabled, unless
    /// an engine is supplied programmatically.
    #[serde(default)]
    pub command: Option<CommandSpec>,
    /// Backend settings.
    #[serde(default)]
    pub settings: S,
}

const fn default_true() -> bool {
    true
}

impl<S: Default> Default for BackendConfig<S> {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            settings: S::default(),
        }
    }
}

/// `[classes]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassesConfig {
    /// Quantile breakpoints, from 0 to 1.
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<f64>,
    /// Variables to map. Defaults to every variable the enabled backends
    /// produce.
    #[serde(default)]
    pub variables: Option<Vec<MapVariable>>,
}

fn default_breakpoints() -> Vec<f64> {
    vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]
}

impl Default for ClassesConfig {
    fn default() -> Self {
        Self {
            breakpoints: default_breakpoints(),
            variables: None,
        }
    }
}

impl ClassesConfig {
    /// Validated breakpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Classify`] if the breakpoints are invalid.
    pub fn breakpoints(&self) -> Result<Breakpoints, ReportError> {
        Ok(Breakpoints::new(self.breakpoints.clone())?)
    }
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving every report artifact.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Run the two backends concurrently.
    #[serde(default)]
    pub parallel_backends: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("report")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            parallel_backends: false,
        }
    }
}

impl ReportConfig {
    /// Reads and parses `path`, resolving relative paths against its
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the file cannot be read or
    /// [`ReportError::Config`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|e| ReportError::Config {
            message: format!("{}: {e}", path.display()),
        })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Config`] if the text does not parse.
    pub fn parse(text: &str) -> Result<Self, ReportError> {
        toml::from_str(text).map_err(|e| ReportError::Config {
            message: e.to_string(),
        })
    }

    /// Makes every relative path in the configuration relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        resolve(&mut self.input.table);
        resolve(&mut self.input.geometry);
        resolve(&mut self.output.dir);
        if let Some(command) = &mut self.simulation.command {
            resolve(&mut command.work_dir);
        }
        if let Some(command) = &mut self.approximation.command {
            resolve(&mut command.work_dir);
        }
    }

    /// Backends that will run, in report order.
    #[must_use]
    pub fn enabled_backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .iter()
            .copied()
            .filter(|kind| match kind {
                BackendKind::Simulation => self.simulation.enabled,
                BackendKind::Approximation => self.approximation.enabled,
            })
            .collect()
    }

    /// Checks everything that does not need the input data.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found: invalid breakpoints,
    /// theme, snap distance, or backend settings.
    pub fn validate(&self) -> Result<(), ReportError> {
        let breakpoints = self.classes.breakpoints()?;
        self.theme.validate()?;
        self.theme.class_palette(breakpoints.classes())?;

        if !self.graph.snap.is_finite() || self.graph.snap < 0.0 {
            return Err(ReportError::Config {
                message: format!("graph.snap {} must be finite and non-negative", self.graph.snap),
            });
        }

        if self.simulation.enabled {
            disease_map_model::simulation::validate(&self.simulation.settings)?;
        }

        if let Some(variables) = &self.classes.variables {
            let enabled = self.enabled_backends();
            let disabled = variables.iter().find_map(|&variable| {
                variable_backend(variable)
                    .filter(|backend| !enabled.contains(backend))
                    .map(|backend| (variable, backend))
            });
            if let Some((variable, backend)) = disabled {
                return Err(ReportError::Config {
                    message: format!(
                        "classes.variables includes {variable} but the {backend} backend is disabled"
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Backend a mapped variable comes from, if any.
#[must_use]
pub const fn variable_backend(variable: MapVariable) -> Option<BackendKind> {
    match variable {
        MapVariable::Rme => None,
        MapVariable::SimulationRisk | MapVariable::SimulationProbability => {
            Some(BackendKind::Simulation)
        }
        MapVariable::ApproximationRisk | MapVariable::ApproximationProbability => {
            Some(BackendKind::Approximation)
        }
    }
}

#[cfg(test)]
mod tests {
    use disease_map_spatial::{Contiguity, IsolatedUnitPolicy};

    use super::*;

    const MINIMAL: &str = r#"
[input]
table = "data/deaths.csv"
geometry = "data/munis.geojson"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ReportConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.graph.rule, Contiguity::Queen);
        assert_eq!(config.graph.isolated, IsolatedUnitPolicy::Allow);
        assert_eq!(config.policy.zero_expected, ZeroExpectedPolicy::Zero);
        assert_eq!(config.simulation.settings, SimulationSettings::default());
        assert_eq!(config.approximation.settings.graph_file, "graph.txt");
        assert_eq!(config.classes.breakpoints().unwrap().classes(), 5);
        assert_eq!(config.output.dir, PathBuf::from("report"));
        assert_eq!(
            config.enabled_backends(),
            vec![BackendKind::Simulation, BackendKind::Approximation]
        );
        config.validate().unwrap();
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
[input]
table = "deaths.csv"
geometry = "munis.geojson"
matching = "numeric"

[input.columns]
code = "CODMUNI"
name = "MUNICIPIO"
delimiter = ";"

[input.properties]
code = "CODIGOINE"

[graph]
rule = "rook"
isolated = "reject"

[policy]
zero_expected = "reject"

[simulation]
enabled = false

[approximation.command]
program = "Rscript"
args = ["bym_laplace.R"]
work_dir = "work"

[classes]
breakpoints = [0.0, 0.25, 0.5, 0.75, 1.0]
variables = ["rme", "approximation_risk"]

[theme]
width = 600

[output]
dir = "out"
parallel_backends = true
"#;
        let config = ReportConfig::parse(text).unwrap();

        assert_eq!(config.input.matching, CodeMatching::Numeric);
        assert_eq!(config.input.columns.delimiter, ';');
        assert_eq!(config.input.columns.observed, "O");
        assert_eq!(config.input.properties.code, "CODIGOINE");
        assert_eq!(config.graph.rule, Contiguity::Rook);
        assert_eq!(config.policy.zero_expected, ZeroExpectedPolicy::Reject);
        assert_eq!(config.enabled_backends(), vec![BackendKind::Approximation]);
        assert_eq!(
            config.approximation.command.as_ref().unwrap().args,
            vec!["bym_laplace.R"]
        );
        assert_eq!(config.theme.width, 600);
        assert!(config.output.parallel_backends);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let text = format!("{MINIMAL}\n[output]\ndirectory = \"x\"\n");
        assert!(matches!(
            ReportConfig::parse(&text),
            Err(ReportError::Config { .. })
        ));
    }

    #[test]
    fn burn_in_past_iterations_fails_validation() {
        let text = format!("{MINIMAL}\n[simulation.settings]\niterations = 100\nburn_in = 150\n");
        let config = ReportConfig::parse(&text).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Config);
    }

    #[test]
    fn bad_breakpoints_fail_validation() {
        let text = format!("{MINIMAL}\n[classes]\nbreakpoints = [0.0, 0.6, 0.4, 1.0]\n");
        let err = ReportConfig::parse(&text).unwrap().validate().unwrap_err();
        assert!(matches!(err, ReportError::Classify(_)));
        assert_eq!(err.category(), crate::ErrorCategory::Config);
    }

    #[test]
    fn disabled_backend_variables_fail_validation() {
        let text = format!(
            "{MINIMAL}\n[simulation]\nenabled = false\n[classes]\nvariables = [\"simulation_risk\"]\n"
        );
        assert!(matches!(
            ReportConfig::parse(&text).unwrap().validate(),
            Err(ReportError::Config { .. })
        ));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let mut config = ReportConfig::parse(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/srv/study"));
        assert_eq!(config.input.table, PathBuf::from("/srv/study/data/deaths.csv"));
        assert_eq!(config.output.dir, PathBuf::from("/srv/study/report"));
    }
}
