//! GeoJSON output layer.
//!
//! Each feature carries the unit's table columns plus, for every mapped
//! variable, `<variable>` (the value), `<variable>_class` (0-based class)
//! and `<variable>_label` (interval label).

use disease_map_geography_models::ReportRow;
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};

use crate::{MapLayer, RenderError, check_alignment};

/// Builds the output feature collection, one feature per row.
///
/// # Errors
///
/// Returns [`RenderError`] if the inputs are misaligned or a row cannot be
/// serialized.
pub fn feature_collection(
    rows: &[ReportRow],
    geometries: &[MultiPolygon<f64>],
    layers: &[MapLayer],
) -> Result<FeatureCollection, RenderError> {
    check_alignment(rows, geometries, layers)?;

    let features = rows
        .iter()
        .zip(geometries)
        .enumerate()
        .map(|(i, (row, geometry))| {
            let mut properties = row_properties(row)?;
            for layer in layers {
                let key = layer.variable.as_ref();
                properties.insert(key.to_string(), json_number(layer.variable.value(row)));
                properties.insert(
                    format!("{key}_class"),
                    JsonValue::from(layer.classification.bins[i]),
                );
                properties.insert(
                    format!("{key}_label"),
                    layer.label_of(i).map_or(JsonValue::Null, JsonValue::from),
                );
            }

            Ok(Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(geometry))),
                id: Some(geojson::feature::Id::String(row.code.clone())),
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, RenderError>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn row_properties(row: &ReportRow) -> Result<JsonObject, RenderError> {
    match serde_json::to_value(row)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(RenderError::Misaligned {
            message: format!("row {} serialized to {other}", row.code),
        }),
    }
}

fn json_number(value: Option<f64>) -> JsonValue {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(JsonValue::Null, JsonValue::Number)
}
