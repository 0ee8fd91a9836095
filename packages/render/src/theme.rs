//! Map presentation settings.

use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

use crate::RenderError;

/// Presentation settings applied to every rendered map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapTheme {
    /// Report title.
    pub title: String,
    /// Sequential palette, low to high, as `#rrggbb`. Classes sample it
    /// evenly, so it needs at least as many entries as there are classes.
    pub palette: Vec<String>,
    /// Canvas background.
    pub background: String,
    /// Unit outline color.
    pub stroke: String,
    /// Unit outline width in pixels.
    pub stroke_width: u32,
    /// Static map width in pixels.
    pub width: u32,
    /// Static map height in pixels.
    pub height: u32,
    /// Blank border around the static map in pixels.
    pub margin: u32,
    /// Decimal places in class labels.
    pub label_precision: usize,
    /// Fill opacity of the interactive map.
    pub fill_opacity: f64,
    /// Tile URL template of the interactive map's base layer.
    pub tile_url: String,
    /// Attribution shown for the base layer.
    pub tile_attribution: String,
}

impl Default for MapTheme {
    fn default() -> Self {
        Self {
            title: "Ischemic heart disease mortality".to_string(),
            palette: ["#ffffb2", "#fecc5c", "#fd8d3c", "#f03b20", "#bd0026"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            background: "#ffffff".to_string(),
            stroke: "#636363".to_string(),
            stroke_width: 1,
            width: 800,
            height: 800,
            margin: 10,
            label_precision: 2,
            fill_opacity: 0.7,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            tile_attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

impl MapTheme {
    /// Checks everything that can be checked without knowing the class
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Theme`] for an empty palette, a malformed
    /// color, a canvas too small for its margin, or an opacity outside
    /// `[0, 1]`.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.palette.is_empty() {
            return Err(theme_error("palette is empty"));
        }
        for color in self.palette.iter().chain([&self.background, &self.stroke]) {
            parse_hex(color)?;
        }
        let fits = self
            .margin
            .checked_mul(2)
            .is_some_and(|margins| self.width > margins && self.height > margins);
        if !fits {
            return Err(theme_error(&format!(
                "{}x{} canvas leaves no room inside a {}px margin",
                self.width, self.height, self.margin
            )));
        }
        if !(0.0..=1.0).contains(&self.fill_opacity) {
            return Err(theme_error(&format!(
                "fill_opacity {} outside [0, 1]",
                self.fill_opacity
            )));
        }
        Ok(())
    }

    /// Palette colors for `classes` classes, sampled evenly from low to
    /// high.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Theme`] if the palette has fewer entries than
    /// `classes` or an entry is malformed.
    pub fn class_palette(&self, classes: usize) -> Result<Vec<String>, RenderError> {
        let len = self.palette.len();
        if classes > len {
            return Err(theme_error(&format!(
                "{classes} classes need at least {classes} palette colors, found {len}"
            )));
        }

        let picked: Vec<String> = match classes {
            0 => Vec::new(),
            1 => vec![self.palette[0].clone()],
            _ => (0..classes)
                .map(|k| self.palette[k * (len - 1) / (classes - 1)].clone())
                .collect(),
        };
        for color in &picked {
            parse_hex(color)?;
        }
        Ok(picked)
    }
}

fn theme_error(message: &str) -> RenderError {
    RenderError::Theme {
        message: message.to_string(),
    }
}

/// Parses `#rrggbb`.
///
/// # Errors
///
/// Returns [`RenderError::Theme`] if `hex` is not a six-digit hex color.
pub fn parse_hex(hex: &str) -> Result<RGBColor, RenderError> {
    let digits = hex
        .strip_prefix('#')
        .filter(|d| d.len() == 6 && d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| theme_error(&format!("'{hex}' is not a #rrggbb color")))?;

    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| theme_error(&format!("'{hex}' is not a #rrggbb color")))
    };

    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}
