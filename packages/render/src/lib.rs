#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output rendering for the disease-mapping report.
//!
//! Everything rendered here comes from [`ReportRow`]s plus the unit
//! geometries (in the same order) and one classified [`MapLayer`] per
//! mapped variable. Presentation settings are carried by an explicit
//! [`MapTheme`].
//!
//! Artifacts written by [`render_report`]:
//!
//! * `units.csv` - the per-unit table
//! * `units.geojson` - unit boundaries with every table column and the
//!   class of each mapped variable as properties
//! * `<variable>.svg` - one static choropleth per mapped variable
//! * `report.html` - the static maps plus an interactive Leaflet map

pub mod html;
pub mod layer;
pub mod svg;
pub mod table;
pub mod theme;
pub mod variable;

use std::path::{Path, PathBuf};

use disease_map_classify::Classification;
use disease_map_geography_models::ReportRow;
use geo::MultiPolygon;
use thiserror::Error;

pub use theme::MapTheme;
pub use variable::MapVariable;

/// Errors that can occur while rendering outputs.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Writing an output file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Writing the unit table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serializing JSON failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The plotting backend failed.
    #[error("Plot error: {message}")]
    Plot {
        /// Backend error text.
        message: String,
    },

    /// The theme is unusable.
    #[error("Invalid theme: {message}")]
    Theme {
        /// Description of what is wrong.
        message: String,
    },

    /// Rows, geometries, and class assignments are not aligned.
    #[error("Misaligned render input: {message}")]
    Misaligned {
        /// Description of the mismatch.
        message: String,
    },
}

/// One mapped variable with its quantile classes.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    /// Variable shown.
    pub variable: MapVariable,
    /// Classes of every unit, in row order.
    pub classification: Classification,
    /// Interval label of every class.
    pub labels: Vec<String>,
}

impl MapLayer {
    /// Class label of unit `index`.
    #[must_use]
    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.classification
            .bins
            .get(index)
            .and_then(|&bin| self.labels.get(bin))
            .map(String::as_str)
    }
}

/// Paths of the files written by [`render_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    /// Per-unit table.
    pub units_csv: PathBuf,
    /// GeoJSON layer.
    pub geojson: PathBuf,
    /// Static choropleths, one per layer.
    pub svgs: Vec<PathBuf>,
    /// HTML report.
    pub html: PathBuf,
}

/// Checks that rows, geometries, and every layer describe the same units.
///
/// # Errors
///
/// Returns [`RenderError::Misaligned`] on any length mismatch.
pub fn check_alignment(
    rows: &[ReportRow],
    geometries: &[MultiPolygon<f64>],
    layers: &[MapLayer],
) -> Result<(), RenderError> {
    if rows.len() != geometries.len() {
        return Err(RenderError::Misaligned {
            message: format!("{} rows but {} geometries", rows.len(), geometries.len()),
        });
    }
    for layer in layers {
        if layer.classification.bins.len() != rows.len() {
            return Err(RenderError::Misaligned {
                message: format!(
                    "{} has {} classified units, expected {}",
                    layer.variable,
                    layer.classification.bins.len(),
                    rows.len()
                ),
            });
        }
        if layer.labels.len() != layer.classification.classes() {
            return Err(RenderError::Misaligned {
                message: format!(
                    "{} has {} labels for {} classes",
                    layer.variable,
                    layer.labels.len(),
                    layer.classification.classes()
                ),
            });
        }
    }
    Ok(())
}

/// Writes every report artifact into `out_dir`.
///
/// # Errors
///
/// Returns [`RenderError`] if the inputs are misaligned, the theme is
/// invalid, or any file cannot be written.
pub fn render_report(
    out_dir: &Path,
    rows: &[ReportRow],
    geometries: &[MultiPolygon<f64>],
    layers: &[MapLayer],
    theme: &MapTheme,
) -> Result<RenderedReport, RenderError> {
    check_alignment(rows, geometries, layers)?;
    for layer in layers {
        theme.class_palette(layer.classification.classes())?;
    }

    std::fs::create_dir_all(out_dir).map_err(|source| RenderError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let units_csv = out_dir.join("units.csv");
    table::write_units_csv(&units_csv, rows)?;
    log::info!("Wrote {} rows to {}", rows.len(), units_csv.display());

    let collection = layer::feature_collection(rows, geometries, layers)?;
    let geojson_text = collection.to_string();
    let geojson = out_dir.join("units.geojson");
    write_text(&geojson, &geojson_text)?;
    log::info!("Wrote {}", geojson.display());

    let mut svgs = Vec::with_capacity(layers.len());
    let mut figures = Vec::with_capacity(layers.len());
    for layer in layers {
        let markup = svg::choropleth(geometries, layer, theme)?;
        let path = out_dir.join(format!("{}.svg", layer.variable));
        write_text(&path, &markup)?;
        log::info!("Wrote {} map to {}", layer.variable, path.display());
        figures.push((layer, markup));
        svgs.push(path);
    }

    let html_path = out_dir.join("report.html");
    let page = html::report_page(rows, &geojson_text, &figures, theme)?;
    write_text(&html_path, &page)?;
    log::info!("Wrote {}", html_path.display());

    Ok(RenderedReport {
        units_csv,
        geojson,
        svgs,
        html: html_path,
    })
}

fn write_text(path: &Path, text: &str) -> Result<(), RenderError> {
    std::fs::write(path, text).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{geometries, layer, rows};
    use super::*;

    #[test]
    fn writes_every_artifact() {
        let dir = std::env::temp_dir().join(format!("disease_map_render_{}", std::process::id()));
        let rows = rows();
        let layers = vec![
            layer(&rows, MapVariable::Rme),
            layer(&rows, MapVariable::SimulationRisk),
        ];

        let report =
            render_report(&dir, &rows, &geometries(), &layers, &MapTheme::default()).unwrap();

        assert!(report.units_csv.exists());
        assert!(report.geojson.exists());
        assert_eq!(report.svgs.len(), 2);
        assert!(report.svgs.iter().all(|p| p.exists()));
        assert!(report.svgs[0].ends_with("rme.svg"));
        let html = std::fs::read_to_string(&report.html).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert!(html.contains("<svg"));
        assert!(html.contains("leaflet"));
    }

    #[test]
    fn misaligned_geometries_are_rejected() {
        let rows = rows();
        let mut geometries = geometries();
        geometries.pop();
        assert!(matches!(
            check_alignment(&rows, &geometries, &[]),
            Err(RenderError::Misaligned { .. })
        ));
    }

    #[test]
    fn layer_labels_follow_bins() {
        let rows = rows();
        let layer = layer(&rows, MapVariable::Rme);
        assert_eq!(layer.label_of(0), Some(layer.labels[0].as_str()));
        assert_eq!(layer.label_of(3), Some(layer.labels[1].as_str()));
        assert_eq!(layer.label_of(9), None);
    }
}
