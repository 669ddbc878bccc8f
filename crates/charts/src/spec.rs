//! Renderer-ready chart specifications.
//!
//! A [`ChartSpec`] is built once per (descriptor, rows) pair and never
//! mutated; a different descriptor produces a new spec.

use adaas_core::Cell;
use serde::Serialize;

use crate::color::Rgba;
use crate::descriptor::ChartKind;
use crate::sampler::FiveNumberSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axes {
    pub x: String,
    pub y: String,
}

/// Rendering hints carried alongside the data.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RenderOptions {
    pub orientation: Orientation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<u32>,
    pub show_legend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: Cell,
    pub y: Cell,
}

/// A coloured heatmap cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub x: String,
    pub y: String,
    pub v: f64,
    pub fill: Rgba,
    pub border: Rgba,
}

/// The data of one series; the variant follows from the chart kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SeriesData {
    Categories { labels: Vec<String>, values: Vec<f64> },
    Points { points: Vec<Point> },
    Summary { summary: FiveNumberSummary },
    Heat { cells: Vec<HeatCell> },
}

impl SeriesData {
    /// Number of plotted marks (bars, points, boxes or cells).
    pub fn len(&self) -> usize {
        match self {
            SeriesData::Categories { labels, .. } => labels.len(),
            SeriesData::Points { points } => points.len(),
            SeriesData::Summary { .. } => 1,
            SeriesData::Heat { cells } => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    #[serde(flatten)]
    pub data: SeriesData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub series: Vec<Series>,
    pub axes: Axes,
    pub options: RenderOptions,
}

impl ChartSpec {
    /// Total marks across all series.
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.data.len()).sum()
    }
}
