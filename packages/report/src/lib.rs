#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Disease-mapping report pipeline.
//!
//! Runs the one-way pipeline described by a [`ReportConfig`]:
//!
//! ```text
//! load -> RME -> neighbour graph -> backend fits -> quantile classes -> render
//! ```
//!
//! Configuration problems are reported before any backend is called, and
//! any error aborts the run before the report is written.

pub mod config;
pub mod pipeline;
pub mod progress;

use std::path::PathBuf;

use disease_map_classify::ClassifyError;
use disease_map_geography::{GeographyError, RiskError};
use disease_map_model::ModelError;
use disease_map_render::RenderError;
use disease_map_spatial::SpatialError;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

pub use config::ReportConfig;
pub use pipeline::{Engines, ReportSummary, run};

/// Errors that can abort a report run.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what is wrong.
        message: String,
    },

    /// A file could not be read or written.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Loading or joining the inputs failed.
    #[error(transparent)]
    Geography(#[from] GeographyError),

    /// A standardized ratio could not be computed.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Building or writing the neighbour graph failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// A backend failed or returned unusable output.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Classification failed.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A backend task panicked or was cancelled.
    #[error("Backend task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Broad class of a [`ReportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad or inconsistent input data.
    Data,
    /// Invalid configuration, detected before any backend call.
    Config,
    /// Backend output does not line up with the input units.
    Integrity,
    /// A ratio with zero expected deaths.
    DivideByZero,
    /// An external engine failed.
    Backend,
    /// Filesystem or rendering failure.
    Output,
}

impl ReportError {
    /// Broad class of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. }
            | Self::Model(ModelError::Config { .. })
            | Self::Classify(ClassifyError::InvalidBreakpoints { .. })
            | Self::Render(RenderError::Theme { .. }) => ErrorCategory::Config,
            Self::Geography(_)
            | Self::Spatial(_)
            | Self::Model(ModelError::InvalidInput { .. } | ModelError::Graph(_))
            | Self::Classify(_) => ErrorCategory::Data,
            Self::Model(ModelError::Integrity { .. }) | Self::Render(RenderError::Misaligned { .. }) => {
                ErrorCategory::Integrity
            }
            Self::Risk(RiskError::DivideByZero { .. }) => ErrorCategory::DivideByZero,
            Self::Model(
                ModelError::Backend { .. }
                | ModelError::Io { .. }
                | ModelError::Csv(_)
                | ModelError::Json(_),
            )
            | Self::Task(_) => ErrorCategory::Backend,
            Self::Io { .. } | Self::Render(_) => ErrorCategory::Output,
        }
    }
}

#[cfg(test)]
mod tests {
    use disease_map_model_models::BackendKind;

    use super::*;

    #[test]
    fn categories() {
        let config = ReportError::from(ModelError::Config {
            backend: BackendKind::Simulation,
            message: "thin".to_string(),
        });
        assert_eq!(config.category(), ErrorCategory::Config);

        let integrity = ReportError::from(ModelError::Integrity {
            backend: BackendKind::Approximation,
            message: "728 results for 729 input units".to_string(),
        });
        assert_eq!(integrity.category(), ErrorCategory::Integrity);

        let divide = ReportError::from(RiskError::DivideByZero {
            code: "04001".to_string(),
            observed: 2,
        });
        assert_eq!(divide.category(), ErrorCategory::DivideByZero);
        assert_eq!(divide.category().to_string(), "divide_by_zero");

        let join = ReportError::from(GeographyError::EmptyJoin);
        assert_eq!(join.category(), ErrorCategory::Data);
    }
}
