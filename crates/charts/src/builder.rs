//! Descriptor + rows → [`ChartSpec`].

use adaas_core::{Cell, Row};

use crate::color::{intensity_color, max_intensity};
use crate::descriptor::{ChartDescriptor, ChartKind};
use crate::sampler::{self, CategorySeries, ChartLimits};
use crate::spec::{Axes, ChartSpec, HeatCell, Point, RenderOptions, Series, SeriesData};

/// Builds chart specs under a fixed set of output caps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartBuilder {
    limits: ChartLimits,
}

impl ChartBuilder {
    pub fn new(limits: ChartLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ChartLimits {
        &self.limits
    }

    /// Build the chart described by `descriptor` from `rows`.
    ///
    /// Returns `None` when the descriptor names too few fields for its kind
    /// or when no data point survives sampling.
    pub fn build(&self, descriptor: &ChartDescriptor, rows: &[Row]) -> Option<ChartSpec> {
        let kind = descriptor.kind;
        let fields = &descriptor.fields;

        if fields.len() < kind.min_fields() {
            tracing::debug!(
                chart = %kind,
                fields = fields.len(),
                required = kind.min_fields(),
                "chart skipped: not enough fields"
            );
            return None;
        }

        let built = match kind {
            ChartKind::Bar | ChartKind::Histogram | ChartKind::Pie => self.categorical(fields, rows),
            ChartKind::Scatter => self.scatter(fields, rows),
            ChartKind::Line => self.line(fields, rows),
            ChartKind::Boxplot => self.boxplot(fields, rows),
            ChartKind::Heatmap => self.heatmap(fields, rows),
        };

        let Some((series, axes)) = built else {
            tracing::debug!(chart = %kind, "chart skipped: no data points");
            return None;
        };

        Some(ChartSpec {
            kind,
            title: descriptor.title(),
            series,
            axes,
            options: RenderOptions {
                orientation: descriptor.orientation(),
                bins: descriptor.bins(),
                show_legend: kind == ChartKind::Pie,
            },
        })
    }

    fn categorical(&self, fields: &[String], rows: &[Row]) -> Option<(Vec<Series>, Axes)> {
        let (data, label, y_axis) = match fields {
            [field] => (
                sampler::frequency_distribution(rows, field, self.limits.max_categories),
                "Count".to_string(),
                "Count".to_string(),
            ),
            [category, value, ..] => (
                sampler::categorical_mean(rows, category, value, self.limits.max_mean_categories),
                value.clone(),
                format!("Mean {value}"),
            ),
            [] => return None,
        };
        if data.is_empty() {
            return None;
        }
        let CategorySeries { labels, values } = data;
        Some((
            vec![Series {
                label,
                data: SeriesData::Categories { labels, values },
            }],
            Axes {
                x: fields[0].clone(),
                y: y_axis,
            },
        ))
    }

    fn scatter(&self, fields: &[String], rows: &[Row]) -> Option<(Vec<Series>, Axes)> {
        let (x, y) = (&fields[0], &fields[1]);
        let points: Vec<Point> = sampler::scatter_pairs(rows, x, y, self.limits.max_scatter_points)
            .into_iter()
            .map(|(px, py)| Point {
                x: Cell::Number(px),
                y: Cell::Number(py),
            })
            .collect();
        if points.is_empty() {
            return None;
        }
        Some((
            vec![Series {
                label: format!("{x} vs {y}"),
                data: SeriesData::Points { points },
            }],
            Axes { x: x.clone(), y: y.clone() },
        ))
    }

    fn line(&self, fields: &[String], rows: &[Row]) -> Option<(Vec<Series>, Axes)> {
        let (x, y) = (&fields[0], &fields[1]);
        let points: Vec<Point> = sampler::sorted_line_series(rows, x, y, self.limits.max_line_points)
            .into_iter()
            .map(|(px, py)| Point { x: px, y: py })
            .collect();
        if points.is_empty() {
            return None;
        }
        Some((
            vec![Series {
                label: y.clone(),
                data: SeriesData::Points { points },
            }],
            Axes { x: x.clone(), y: y.clone() },
        ))
    }

    fn boxplot(&self, fields: &[String], rows: &[Row]) -> Option<(Vec<Series>, Axes)> {
        let series: Vec<Series> = fields
            .iter()
            .filter_map(|field| {
                sampler::five_number_summary(rows, field).map(|summary| Series {
                    label: field.clone(),
                    data: SeriesData::Summary { summary },
                })
            })
            .collect();
        if series.is_empty() {
            return None;
        }
        Some((
            series,
            Axes {
                x: fields.join(", "),
                y: "Value".to_string(),
            },
        ))
    }

    fn heatmap(&self, fields: &[String], rows: &[Row]) -> Option<(Vec<Series>, Axes)> {
        let (x, y) = (&fields[0], &fields[1]);
        let value_field = fields.get(2).map(String::as_str);
        let triples = sampler::heatmap_triples(rows, x, y, value_field, self.limits.max_scatter_points);
        if triples.is_empty() {
            return None;
        }

        let max = max_intensity(triples.iter().map(|t| t.v));
        let cells = triples
            .into_iter()
            .map(|t| {
                let color = intensity_color(t.v, max);
                HeatCell {
                    x: t.x,
                    y: t.y,
                    v: t.v,
                    fill: color.fill,
                    border: color.border,
                }
            })
            .collect();

        Some((
            vec![Series {
                label: value_field.unwrap_or("Count").to_string(),
                data: SeriesData::Heat { cells },
            }],
            Axes { x: x.clone(), y: y.clone() },
        ))
    }
}

/// [`ChartBuilder::build`] with default limits.
pub fn build(descriptor: &ChartDescriptor, rows: &[Row]) -> Option<ChartSpec> {
    ChartBuilder::default().build(descriptor, rows)
}
