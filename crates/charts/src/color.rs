//! Heatmap intensity → colour mapping.

use serde::{Serialize, Serializer};

/// Fixed green channel for every heatmap colour.
pub const HEAT_GREEN: u8 = 100;
/// Alpha used for cell fills.
pub const FILL_ALPHA: f64 = 0.7;
/// Alpha used for cell borders.
pub const BORDER_ALPHA: f64 = 1.0;

/// Channel value of the neutral colour used when there is no intensity range.
const NEUTRAL_CHANNEL: u8 = 128;

/// An RGBA colour, serialized as a CSS `rgba(...)` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

impl core::fmt::Display for Rgba {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.css())
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fill and border colour of one heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatColor {
    pub fill: Rgba,
    pub border: Rgba,
}

impl HeatColor {
    fn from_channels(r: u8, g: u8, b: u8) -> Self {
        Self {
            fill: Rgba { r, g, b, a: FILL_ALPHA },
            border: Rgba { r, g, b, a: BORDER_ALPHA },
        }
    }

    /// Grey used when the intensity range is degenerate (all zeros, negative
    /// or non-finite maximum).
    pub fn neutral() -> Self {
        Self::from_channels(NEUTRAL_CHANNEL, NEUTRAL_CHANNEL, NEUTRAL_CHANNEL)
    }
}

/// Largest finite value, or `0.0` for an empty input.
pub fn max_intensity(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(0.0)
}

/// Map `value` onto a blue→red ramp relative to `max`.
///
/// `red = 255·(v/max)`, `blue = 255·(1 − v/max)`, green fixed. The ratio is
/// clamped to `[0, 1]` so out-of-range values saturate instead of wrapping.
pub fn intensity_color(value: f64, max: f64) -> HeatColor {
    if !(max.is_finite() && max > 0.0) {
        return HeatColor::neutral();
    }
    let ratio = if value.is_finite() { (value / max).clamp(0.0, 1.0) } else { 0.0 };
    let red = (255.0 * ratio).round() as u8;
    let blue = (255.0 * (1.0 - ratio)).round() as u8;
    HeatColor::from_channels(red, HEAT_GREEN, blue)
}
