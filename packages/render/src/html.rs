//! HTML report page.

use std::fmt::Write as _;

use disease_map_geography_models::ReportRow;
use serde::Serialize;

use crate::{MapLayer, MapTheme, RenderError};

const TEMPLATE: &str = include_str!("../templates/report.html");

/// Interactive-map description of one layer.
#[derive(Debug, Serialize)]
struct LayerSpec<'a> {
    variable: &'a str,
    title: &'a str,
    colors: Vec<String>,
    labels: &'a [String],
    counts: &'a [usize],
}

/// Builds the report page from pre-rendered SVG figures and the GeoJSON
/// text of the unit layer.
///
/// # Errors
///
/// Returns [`RenderError`] if the theme cannot color a layer or JSON
/// serialization fails.
pub fn report_page(
    rows: &[ReportRow],
    geojson: &str,
    figures: &[(&MapLayer, String)],
    theme: &MapTheme,
) -> Result<String, RenderError> {
    let mut figure_html = String::new();
    let mut specs = Vec::with_capacity(figures.len());

    for (layer, svg) in figures {
        let colors = theme.class_palette(layer.classification.classes())?;
        let title = layer.variable.label();

        let _ = writeln!(figure_html, "<figure>");
        let _ = writeln!(figure_html, "<figcaption>{}</figcaption>", escape(title));
        figure_html.push_str(svg);
        let _ = writeln!(figure_html, "\n<ul class=\"legend\">");
        for ((color, label), count) in colors
            .iter()
            .zip(&layer.labels)
            .zip(&layer.classification.counts)
        {
            let _ = writeln!(
                figure_html,
                "<li><span class=\"swatch\" style=\"background:{}\"></span>{} ({count})</li>",
                escape(color),
                escape(label)
            );
        }
        let _ = writeln!(figure_html, "</ul>\n</figure>");

        specs.push(LayerSpec {
            variable: layer.variable.as_ref(),
            title,
            colors,
            labels: &layer.labels,
            counts: &layer.classification.counts,
        });
    }

    let replacements = [
        ("{{title}}", escape(&theme.title)),
        ("{{summary}}", summary_rows(rows)),
        ("{{figures}}", figure_html),
        ("{{geojson}}", script_safe(geojson)),
        ("{{layers}}", script_safe(&serde_json::to_string(&specs)?)),
        ("{{tile_url}}", script_safe(&serde_json::to_string(&theme.tile_url)?)),
        (
            "{{tile_attribution}}",
            script_safe(&serde_json::to_string(&theme.tile_attribution)?),
        ),
        ("{{stroke}}", script_safe(&serde_json::to_string(&theme.stroke)?)),
        ("{{precision}}", theme.label_precision.to_string()),
        ("{{fill_opacity}}", theme.fill_opacity.to_string()),
    ];

    let mut page = TEMPLATE.to_string();
    for (placeholder, value) in replacements {
        page = page.replace(placeholder, &value);
    }
    Ok(page)
}

#[allow(clippy::cast_precision_loss)]
fn summary_rows(rows: &[ReportRow]) -> String {
    let observed: u64 = rows.iter().map(|r| r.observed).sum();
    let expected: f64 = rows.iter().map(|r| r.expected).sum();
    let overall = if expected > 0.0 {
        format!("{:.3}", observed as f64 / expected)
    } else {
        "n/a".to_string()
    };

    let mut html = String::new();
    let _ = writeln!(html, "<tr><th>Units</th><td>{}</td></tr>", rows.len());
    let _ = writeln!(html, "<tr><th>Observed deaths</th><td>{observed}</td></tr>");
    let _ = writeln!(html, "<tr><th>Expected deaths</th><td>{expected:.1}</td></tr>");
    let _ = writeln!(html, "<tr><th>Overall O/E</th><td>{overall}</td></tr>");
    html
}

/// Escapes text for HTML element content and attribute values.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Keeps JSON embedded in a `<script>` block from closing it early.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use crate::MapVariable;
    use crate::test_support::{layer, rows};

    use super::*;

    #[test]
    fn page_has_no_unfilled_placeholders() {
        let rows = rows();
        let layer = layer(&rows, MapVariable::Rme);
        let figures = vec![(&layer, "<svg></svg>".to_string())];
        let page = report_page(&rows, "{}", &figures, &MapTheme::default()).unwrap();

        assert!(!page.contains("{{"));
        assert!(page.contains("<figcaption>Standardized mortality ratio (RME)</figcaption>"));
        assert!(page.contains("\"variable\":\"rme\""));
        assert!(page.contains("<tr><th>Units</th><td>4</td></tr>"));
    }

    #[test]
    fn names_are_escaped() {
        let mut rows = rows();
        rows[0].name = "</script><b>".to_string();
        assert_eq!(escape(&rows[0].name), "&lt;/script&gt;&lt;b&gt;");
        assert_eq!(script_safe("\"</script>\""), "\"<\\/script>\"");
    }

    #[test]
    fn hover_panel_inserts_feature_properties_as_text() {
        let rows = rows();
        let layer = layer(&rows, MapVariable::Rme);
        let figures = vec![(&layer, "<svg></svg>".to_string())];
        let page = report_page(&rows, "{}", &figures, &MapTheme::default()).unwrap();

        assert!(!page.contains("innerHTML"));
        assert!(page.contains("title.textContent = props.name || props.code;"));
    }

    #[test]
    fn overall_ratio_in_summary() {
        // O = 0 + 3 + 6 + 9 = 18, E = 16.
        assert!(summary_rows(&rows()).contains("<td>1.125</td>"));
    }
}
