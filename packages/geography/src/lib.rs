#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mortality count and municipal boundary loading.
//!
//! Reads observed/expected death counts from a CSV table and municipality
//! polygons from a `GeoJSON` layer, inner-joins them on the municipality
//! code, and derives the raw standardized mortality ratio (RME) for each
//! resulting [`SpatialUnit`].

pub mod boundaries;
pub mod join;
pub mod risk;
pub mod table;

use std::path::PathBuf;

use disease_map_geography_models::{CodeMatching, MortalityRecord, ZeroExpectedPolicy};
use geo::MultiPolygon;
use thiserror::Error;

pub use risk::RiskError;

/// Errors that can occur while loading or joining the input data.
#[derive(Debug, Error)]
pub enum GeographyError {
    /// Reading an input file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A required column is absent from the table header.
    #[error("Missing column '{column}' in mortality table")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A required feature property is absent.
    #[error("Feature {index} has no '{property}' property")]
    MissingProperty {
        /// Zero-based feature index in the collection.
        index: usize,
        /// Name of the missing property.
        property: String,
    },

    /// A cell or property held a value that could not be interpreted.
    #[error("Invalid value for unit '{code}': {message}")]
    InvalidValue {
        /// Municipality code of the offending row.
        code: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The same code appears more than once in one input.
    #[error("Duplicate municipality code '{code}' in {input}")]
    DuplicateCode {
        /// The repeated code.
        code: String,
        /// Which input the duplicate was found in.
        input: &'static str,
    },

    /// A feature geometry is not a polygon or multipolygon.
    #[error("Unit '{code}' has unsupported geometry type {kind}")]
    UnsupportedGeometry {
        /// Municipality code of the feature.
        code: String,
        /// Geometry type that was found.
        kind: String,
    },

    /// The top-level `GeoJSON` object is not a feature collection.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// No unit appears in both inputs.
    #[error("No municipality codes matched between the table and the geometry layer")]
    EmptyJoin,
}

/// One municipality after the join: geometry plus observed and expected
/// counts.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialUnit {
    /// Municipality code.
    pub code: String,
    /// Municipality name, if either input provided one.
    pub name: Option<String>,
    /// Boundary polygon(s).
    pub geometry: MultiPolygon<f64>,
    /// Observed death count (O).
    pub observed: u64,
    /// Expected death count (E).
    pub expected: f64,
}

impl SpatialUnit {
    /// Raw standardized mortality ratio `O / E` for this unit.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::DivideByZero`] if `E = 0` and the policy does
    /// not define the ratio.
    pub fn rme(&self, policy: ZeroExpectedPolicy) -> Result<f64, RiskError> {
        risk::standardized_ratio(&self.code, self.observed, self.expected, policy)
    }

    /// The tabular part of this unit.
    #[must_use]
    pub fn record(&self) -> MortalityRecord {
        MortalityRecord {
            code: self.code.clone(),
            name: self.name.clone(),
            observed: self.observed,
            expected: self.expected,
        }
    }
}

/// Where to find the inputs and how to read them.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    /// Path to the mortality CSV.
    pub table_path: PathBuf,
    /// Column layout of the mortality CSV.
    pub table: table::TableColumns,
    /// Path to the `GeoJSON` boundary layer.
    pub geometry_path: PathBuf,
    /// Property layout of the boundary layer.
    pub geometry: boundaries::FeatureProperties,
    /// How codes from the two inputs are compared.
    pub matching: CodeMatching,
}

/// Loads both inputs and joins them into spatial units.
///
/// Units are returned in the order of the boundary layer. Units present in
/// only one input are dropped with a warning.
///
/// # Errors
///
/// Returns [`GeographyError`] if either input is unreadable or malformed,
/// or if the join is empty.
pub fn load(spec: &LoadSpec) -> Result<Vec<SpatialUnit>, GeographyError> {
    let records = table::read_mortality_csv(&spec.table_path, &spec.table)?;
    log::info!(
        "Read {} mortality records from {}",
        records.len(),
        spec.table_path.display()
    );

    let boundaries = boundaries::read_boundaries(&spec.geometry_path, &spec.geometry)?;
    log::info!(
        "Read {} boundaries from {}",
        boundaries.len(),
        spec.geometry_path.display()
    );

    join::inner_join(records, boundaries, spec.matching)
}
