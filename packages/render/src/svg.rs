//! Static SVG choropleths.
//!
//! Unit coordinates are drawn on a Cartesian chart whose ranges are padded
//! so one map unit spans the same number of pixels on both axes.

use std::ops::Range;

use geo::{BoundingRect as _, MultiPolygon, Rect};
use plotters::prelude::*;

use crate::theme::parse_hex;
use crate::{MapLayer, RenderError};

fn plot_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Plot {
        message: e.to_string(),
    }
}

/// Renders `layer` over `geometries` as an SVG document.
///
/// # Errors
///
/// Returns [`RenderError`] if the theme is invalid for the layer's class
/// count, there is nothing to draw, or the backend fails.
pub fn choropleth(
    geometries: &[MultiPolygon<f64>],
    layer: &MapLayer,
    theme: &crate::MapTheme,
) -> Result<String, RenderError> {
    theme.validate()?;
    let fills = theme
        .class_palette(layer.classification.classes())?
        .iter()
        .map(|hex| parse_hex(hex))
        .collect::<Result<Vec<_>, _>>()?;
    let background = parse_hex(&theme.background)?;
    let stroke = parse_hex(&theme.stroke)?;

    let extent = extent(geometries).ok_or_else(|| RenderError::Plot {
        message: "no geometry to draw".to_string(),
    })?;
    let inner = (
        theme.width - 2 * theme.margin,
        theme.height - 2 * theme.margin,
    );
    let (x_range, y_range) = fit_ranges(extent, inner);

    let mut markup = String::new();
    {
        let root = SVGBackend::with_string(&mut markup, (theme.width, theme.height))
            .into_drawing_area();
        root.fill(&background).map_err(plot_error)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(theme.margin)
            .build_cartesian_2d(x_range, y_range)
            .map_err(plot_error)?;

        let outline = stroke.stroke_width(theme.stroke_width);

        for (geometry, &bin) in geometries.iter().zip(&layer.classification.bins) {
            let fill = fills.get(bin).copied().unwrap_or(background);

            for polygon in &geometry.0 {
                let exterior = ring(polygon.exterior());
                chart
                    .draw_series(std::iter::once(Polygon::new(exterior.clone(), fill.filled())))
                    .map_err(plot_error)?;
                for hole in polygon.interiors() {
                    chart
                        .draw_series(std::iter::once(Polygon::new(
                            ring(hole),
                            background.filled(),
                        )))
                        .map_err(plot_error)?;
                }

                chart
                    .draw_series(std::iter::once(PathElement::new(exterior, outline)))
                    .map_err(plot_error)?;
                for hole in polygon.interiors() {
                    chart
                        .draw_series(std::iter::once(PathElement::new(ring(hole), outline)))
                        .map_err(plot_error)?;
                }
            }
        }

        root.present().map_err(plot_error)?;
    }

    Ok(markup)
}

fn ring(line: &geo::LineString<f64>) -> Vec<(f64, f64)> {
    line.coords().map(|c| (c.x, c.y)).collect()
}

/// Bounding box of all geometries.
fn extent(geometries: &[MultiPolygon<f64>]) -> Option<Rect<f64>> {
    geometries
        .iter()
        .filter_map(|g| g.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}

/// Expands `extent` along one axis so it matches the pixel aspect ratio of
/// `inner`.
#[allow(clippy::cast_lossless)]
fn fit_ranges(extent: Rect<f64>, inner: (u32, u32)) -> (Range<f64>, Range<f64>) {
    let (min, max) = (extent.min(), extent.max());
    let dx = (max.x - min.x).max(f64::EPSILON);
    let dy = (max.y - min.y).max(f64::EPSILON);
    let (cx, cy) = (min.x.midpoint(max.x), min.y.midpoint(max.y));

    let pixel_aspect = inner.0 as f64 / inner.1 as f64;
    let (half_w, half_h) = if dx / dy > pixel_aspect {
        (dx / 2.0, dx / pixel_aspect / 2.0)
    } else {
        (dy * pixel_aspect / 2.0, dy / 2.0)
    };

    ((cx - half_w)..(cx + half_w), (cy - half_h)..(cy + half_h))
}
