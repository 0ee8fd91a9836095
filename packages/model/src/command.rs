//! External-program backends.
//!
//! Both engines live outside this toolchain (typically R scripts wrapping
//! the MCMC and Laplace packages). Each binding writes its request as JSON
//! into the work directory, runs the configured program with the request
//! and output paths appended to its arguments, and parses the CSV the
//! program leaves behind.
//!
//! Sampler output: a header row, then one row per iteration with the
//! 1-based chain number, the iteration number, and one column per unit.
//! Iteration numbers must increase within each chain.
//!
//! Approximator output: a header row `mean,cdf_at_one,fitted`, then one row
//! per unit in input order.

use std::path::{Path, PathBuf};
use std::process::Command;

use disease_map_model_models::{BackendKind, Chain, MarginalSummary};
use serde::{Deserialize, Serialize};

use crate::ModelError;
use crate::approximation::{ApproximationRequest, Approximator};
use crate::simulation::{Sampler, SamplerRequest};

/// How to invoke an external backend program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable to run (e.g. `Rscript`).
    pub program: String,
    /// Leading arguments (e.g. the script path).
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory for request/response files; also the working directory of
    /// the program.
    pub work_dir: PathBuf,
}

impl CommandSpec {
    fn run(&self, backend: BackendKind, request: &Path, output: &Path) -> Result<(), ModelError> {
        log::debug!(
            "Running {backend} backend: {} {} {} {}",
            self.program,
            self.args.join(" "),
            request.display(),
            output.display()
        );

        match std::fs::remove_file(output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ModelError::Io {
                    path: output.to_path_buf(),
                    source,
                });
            }
        }

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(request)
            .arg(output)
            .current_dir(&self.work_dir)
            .status()
            .map_err(|e| ModelError::Backend {
                backend,
                message: format!("failed to start '{}': {e}", self.program),
            })?;

        if !status.success() {
            return Err(ModelError::Backend {
                backend,
                message: format!("'{}' exited with {status}", self.program),
            });
        }
        if !output.is_file() {
            return Err(ModelError::Backend {
                backend,
                message: format!(
                    "'{}' finished without writing {}",
                    self.program,
                    output.display()
                ),
            });
        }

        Ok(())
    }

    fn prepare<T: Serialize>(&self, name: &str, request: &T) -> Result<PathBuf, ModelError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|source| ModelError::Io {
            path: self.work_dir.clone(),
            source,
        })?;

        let path = absolute(&self.work_dir.join(name));
        let json = serde_json::to_vec(request)?;
        std::fs::write(&path, json).map_err(|source| ModelError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn open_output(path: &Path) -> Result<csv::Reader<std::fs::File>, ModelError> {
    let file = std::fs::File::open(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// MCMC sampler run as an external program.
#[derive(Debug, Clone)]
pub struct CommandSampler {
    spec: CommandSpec,
}

impl CommandSampler {
    /// Creates the binding.
    #[must_use]
    pub const fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Sampler for CommandSampler {
    fn sample(&self, request: &SamplerRequest) -> Result<Vec<Chain>, ModelError> {
        let request_path = self.spec.prepare("sampler_request.json", request)?;
        let output_path = absolute(&self.spec.work_dir.join("sampler_draws.csv"));

        self.spec
            .run(BackendKind::Simulation, &request_path, &output_path)?;

        read_draws(&output_path, request.chains)
    }
}

/// Parses sampler output into chains.
///
/// # Errors
///
/// Returns [`ModelError`] if the file is unreadable, a value does not
/// parse, a chain number falls outside `1..=chains`, or iteration numbers
/// do not increase within a chain.
pub fn read_draws(path: &Path, chains: usize) -> Result<Vec<Chain>, ModelError> {
    let mut rdr = open_output(path)?;
    let mut out = vec![Chain::default(); chains];
    let mut last_iteration: Vec<Option<u64>> = vec![None; chains];

    for (row_idx, row) in rdr.records().enumerate() {
        let row = row?;
        let bad = |message: String| ModelError::Integrity {
            backend: BackendKind::Simulation,
            message: format!("draw row {}: {message}", row_idx + 1),
        };

        let chain: usize = row
            .get(0)
            .and_then(|c| c.parse().ok())
            .filter(|c| (1..=chains).contains(c))
            .ok_or_else(|| bad(format!("chain must be in 1..={chains}")))?;

        let iteration: u64 = row
            .get(1)
            .and_then(|i| i.parse().ok())
            .ok_or_else(|| bad("iteration is not a non-negative integer".to_string()))?;
        if let Some(previous) = last_iteration[chain - 1].filter(|&p| iteration <= p) {
            return Err(bad(format!(
                "chain {chain} iteration {iteration} follows iteration {previous}"
            )));
        }
        last_iteration[chain - 1] = Some(iteration);

        let draw = row
            .iter()
            .skip(2)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| bad(format!("'{v}' is not a number")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        out[chain - 1].draws.push(draw);
    }

    Ok(out)
}

/// Approximation engine run as an external program.
#[derive(Debug, Clone)]
pub struct CommandApproximator {
    spec: CommandSpec,
}

impl CommandApproximator {
    /// Creates the binding.
    #[must_use]
    pub const fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Approximator for CommandApproximator {
    fn approximate(
        &self,
        request: &ApproximationRequest,
    ) -> Result<Vec<MarginalSummary>, ModelError> {
        let request = ApproximationRequest {
            graph_file: absolute(&request.graph_file),
            ..request.clone()
        };
        let request_path = self.spec.prepare("approximation_request.json", &request)?;
        let output_path = absolute(&self.spec.work_dir.join("approximation_marginals.csv"));

        self.spec
            .run(BackendKind::Approximation, &request_path, &output_path)?;

        read_marginals(&output_path)
    }
}

/// Parses approximation output.
///
/// # Errors
///
/// Returns [`ModelError`] if the file is unreadable or a row does not
/// deserialize.
pub fn read_marginals(path: &Path) -> Result<Vec<MarginalSummary>, ModelError> {
    let mut rdr = open_output(path)?;
    let marginals = rdr
        .deserialize::<MarginalSummary>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(marginals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("disease_map_command_{}_{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn draws_are_grouped_by_chain() {
        let path = temp_file(
            "draws.csv",
            "chain,iter,u1,u2\n1,1,0.9,1.1\n2,1,1.0,1.2\n1,2,0.8,1.3\n",
        );
        let chains = read_draws(&path, 2).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(chains[0].draws, vec![vec![0.9, 1.1], vec![0.8, 1.3]]);
        assert_eq!(chains[1].draws, vec![vec![1.0, 1.2]]);
    }

    #[test]
    fn out_of_order_iterations_are_rejected() {
        let path = temp_file(
            "unordered.csv",
            "chain,iter,u1\n1,1,0.9\n2,1,1.0\n1,3,0.8\n1,2,1.1\n",
        );
        let err = read_draws(&path, 2).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ModelError::Integrity { .. }));
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let path = temp_file("bad_chain.csv", "chain,iter,u1\n3,1,0.9\n");
        let err = read_draws(&path, 2).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ModelError::Integrity { .. }));
    }

    #[test]
    fn marginals_by_header() {
        let path = temp_file(
            "marginals.csv",
            "fitted,mean,cdf_at_one\n4.5,0.9,0.6\n12.0,1.5, 0.1\n",
        );
        let marginals = read_marginals(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(marginals.len(), 2);
        assert!((marginals[1].mean - 1.5).abs() < f64::EPSILON);
        assert!((marginals[1].cdf_at_one - 0.1).abs() < f64::EPSILON);
        assert!((marginals[0].fitted - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_program_is_a_backend_error() {
        let spec = CommandSpec {
            program: "disease-map-no-such-program".to_string(),
            args: vec![],
            work_dir: std::env::temp_dir(),
        };
        let err = spec
            .run(
                BackendKind::Simulation,
                Path::new("request.json"),
                Path::new("out.csv"),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::Backend { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn stale_output_is_not_read_back() {
        let work_dir = std::env::temp_dir().join(format!(
            "disease_map_command_stale_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&work_dir).unwrap();
        let stale = work_dir.join("approximation_marginals.csv");
        std::fs::write(&stale, "mean,cdf_at_one,fitted\n9.9,0.0,99.0\n9.9,0.0,99.0\n").unwrap();

        let approximator = CommandApproximator::new(CommandSpec {
            program: "true".to_string(),
            args: vec![],
            work_dir: work_dir.clone(),
        });
        let err = approximator
            .approximate(&ApproximationRequest {
                counts: vec![1, 2],
                exposures: vec![1.0, 2.0],
                graph_file: work_dir.join("graph.txt"),
            })
            .unwrap_err();
        let stale_left = stale.exists();
        std::fs::remove_dir_all(&work_dir).ok();

        assert!(matches!(err, ModelError::Backend { .. }));
        assert!(!stale_left);
    }
}
