//! Municipal boundary reader.
//!
//! Reads a `GeoJSON` `FeatureCollection` whose features carry the
//! municipality code (and optionally its name) as properties. Only
//! `Polygon` and `MultiPolygon` geometries are accepted; polygons are
//! promoted to single-member multipolygons so downstream code handles one
//! shape type.

use std::collections::BTreeSet;
use std::path::Path;

use geo::MultiPolygon;
use geojson::GeoJson;
use serde::{Deserialize, Serialize};

use crate::GeographyError;

/// Feature property names the loader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureProperties {
    /// Property holding the municipality code.
    #[serde(default = "default_code")]
    pub code: String,
    /// Optional property holding the municipality name.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_code() -> String {
    "code".to_string()
}

impl Default for FeatureProperties {
    fn default() -> Self {
        Self {
            code: default_code(),
            name: None,
        }
    }
}

/// A single municipality boundary read from the geometry layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Municipality code.
    pub code: String,
    /// Municipality name, if the layer carries one.
    pub name: Option<String>,
    /// Boundary geometry.
    pub geometry: MultiPolygon<f64>,
}

/// Reads the boundary layer at `path`.
///
/// # Errors
///
/// Returns [`GeographyError`] if the file cannot be read or parsed.
pub fn read_boundaries(
    path: &Path,
    properties: &FeatureProperties,
) -> Result<Vec<Boundary>, GeographyError> {
    let text = std::fs::read_to_string(path).map_err(|source| GeographyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_boundaries(&text, properties)
}

/// Parses a `GeoJSON` `FeatureCollection` into boundaries, preserving
/// feature order.
///
/// # Errors
///
/// Returns [`GeographyError`] if the document is not a feature collection,
/// a feature lacks its code or geometry, a geometry is not polygonal, or a
/// code repeats.
pub fn parse_boundaries(
    text: &str,
    properties: &FeatureProperties,
) -> Result<Vec<Boundary>, GeographyError> {
    let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
        return Err(GeographyError::NotFeatureCollection);
    };

    let mut seen = BTreeSet::new();
    let mut boundaries = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let code = feature
            .property(&properties.code)
            .and_then(property_text)
            .ok_or_else(|| GeographyError::MissingProperty {
                index,
                property: properties.code.clone(),
            })?;

        if !seen.insert(code.clone()) {
            return Err(GeographyError::DuplicateCode {
                code,
                input: "geometry layer",
            });
        }

        let name = properties
            .name
            .as_deref()
            .and_then(|key| feature.property(key))
            .and_then(property_text);

        let Some(geometry) = feature.geometry else {
            return Err(GeographyError::InvalidValue {
                code,
                message: "feature has no geometry".to_string(),
            });
        };

        let geometry = to_multipolygon(&code, geometry)?;

        boundaries.push(Boundary {
            code,
            name,
            geometry,
        });
    }

    Ok(boundaries)
}

/// Renders a string or number property as trimmed text.
fn property_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn to_multipolygon(
    code: &str,
    geometry: geojson::Geometry,
) -> Result<MultiPolygon<f64>, GeographyError> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;

    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        other => Err(GeographyError::UnsupportedGeometry {
            code: code.to_string(),
            kind: geometry_kind(&other).to_string(),
        }),
    }
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYER: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "CODMUNI": 22125, "NOMBRE": " Huesca " },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "CODMUNI": "22130" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[1,0],[2,0],[2,1],[1,1],[1,0]]]]
                }
            }
        ]
    }"#;

    fn props() -> FeatureProperties {
        FeatureProperties {
            code: "CODMUNI".to_string(),
            name: Some("NOMBRE".to_string()),
        }
    }

    #[test]
    fn reads_numeric_and_string_codes() {
        let boundaries = parse_boundaries(LAYER, &props()).unwrap();
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].code, "22125");
        assert_eq!(boundaries[0].name.as_deref(), Some("Huesca"));
        assert_eq!(boundaries[1].code, "22130");
        assert_eq!(boundaries[1].name, None);
        assert_eq!(boundaries[0].geometry.0.len(), 1);
    }

    #[test]
    fn rejects_point_geometry() {
        let layer = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"CODMUNI":"1"},
             "geometry":{"type":"Point","coordinates":[0,0]}}]}"#;
        let err = parse_boundaries(layer, &props()).unwrap_err();
        assert!(matches!(err, GeographyError::UnsupportedGeometry { kind, .. } if kind == "Point"));
    }

    #[test]
    fn rejects_missing_code() {
        let layer = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
        let err = parse_boundaries(layer, &props()).unwrap_err();
        assert!(matches!(err, GeographyError::MissingProperty { index: 0, .. }));
    }

    #[test]
    fn rejects_bare_geometry() {
        let err = parse_boundaries(r#"{"type":"Point","coordinates":[0,0]}"#, &props())
            .unwrap_err();
        assert!(matches!(err, GeographyError::NotFeatureCollection));
    }
}
