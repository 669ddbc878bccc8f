//! Sampling and aggregation over row sets.
//!
//! Every function here is pure and bounded: output size is capped by the
//! caller-supplied limit so a large dataset can never produce an unbounded
//! chart. Grouping always follows *encounter order* (the order in which a
//! distinct value first appears), never frequency or sort order.

use std::collections::HashMap;

use adaas_core::{Cell, Row};
use serde::{Deserialize, Serialize};

/// Output caps applied by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartLimits {
    /// Distinct values kept by a frequency distribution.
    pub max_categories: usize,
    /// Categories kept by a two-field mean aggregation.
    pub max_mean_categories: usize,
    /// Points kept by scatter and heatmap extraction.
    pub max_scatter_points: usize,
    /// Points kept by a sorted line series.
    pub max_line_points: usize,
}

impl Default for ChartLimits {
    fn default() -> Self {
        Self {
            max_categories: 20,
            max_mean_categories: 10,
            max_scatter_points: 500,
            max_line_points: 100,
        }
    }
}

/// Labels with one value each, in encounter order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategorySeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl CategorySeries {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Min / quartiles / max of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// One heatmap cell before colouring.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatTriple {
    pub x: String,
    pub y: String,
    pub v: f64,
}

/// Keeps distinct keys in first-seen order with O(1) lookup.
struct EncounterIndex {
    order: Vec<String>,
    index: HashMap<String, usize>,
}

impl EncounterIndex {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Slot of `key`, registering it if new.
    fn slot(&mut self, key: String) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.order.len();
        self.index.insert(key.clone(), i);
        self.order.push(key);
        i
    }

    fn get(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }
}

/// Count occurrences of each distinct value of `field`.
///
/// The whole row set is counted, then the result is sliced to the first
/// `limit` distinct values encountered. Null and missing cells are skipped.
pub fn frequency_distribution(rows: &[Row], field: &str, limit: usize) -> CategorySeries {
    let mut seen = EncounterIndex::new();
    let mut counts: Vec<u64> = Vec::new();

    for row in rows {
        let cell = row.get(field);
        if cell.is_null() {
            continue;
        }
        let slot = seen.slot(cell.label());
        if slot == counts.len() {
            counts.push(0);
        }
        counts[slot] += 1;
    }

    let keep = limit.min(seen.order.len());
    CategorySeries {
        labels: seen.order.into_iter().take(keep).collect(),
        values: counts.into_iter().take(keep).map(|c| c as f64).collect(),
    }
}

/// Mean of `value_field` for each of the first `limit` categories of
/// `category_field`.
///
/// Non-numeric and missing values are excluded from both sum and count; a
/// category without any numeric value gets a mean of `0`.
pub fn categorical_mean(
    rows: &[Row],
    category_field: &str,
    value_field: &str,
    limit: usize,
) -> CategorySeries {
    let mut categories = EncounterIndex::new();
    for row in rows {
        if categories.order.len() >= limit {
            break;
        }
        let cell = row.get(category_field);
        if !cell.is_null() {
            categories.slot(cell.label());
        }
    }

    let mut sums = vec![0.0_f64; categories.order.len()];
    let mut counts = vec![0_u64; categories.order.len()];

    for row in rows {
        let cat = row.get(category_field);
        if cat.is_null() {
            continue;
        }
        let Some(slot) = categories.get(&cat.label()) else {
            continue;
        };
        if let Some(v) = row.get(value_field).as_number() {
            sums[slot] += v;
            counts[slot] += 1;
        }
    }

    let values = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
        .collect();

    CategorySeries {
        labels: categories.order,
        values,
    }
}

/// `(x, y)` pairs from rows where both fields are finite numbers, in row
/// order, capped at `limit`.
pub fn scatter_pairs(rows: &[Row], x_field: &str, y_field: &str, limit: usize) -> Vec<(f64, f64)> {
    rows.iter()
        .filter_map(|row| {
            let x = row.get(x_field).as_number()?;
            let y = row.get(y_field).as_number()?;
            Some((x, y))
        })
        .take(limit)
        .collect()
}

/// Rows where neither field is null, stably sorted ascending by the first
/// field, then capped at `limit`.
///
/// Sorting happens before truncation so the result is the `limit` smallest
/// x values, not the first `limit` rows.
pub fn sorted_line_series(rows: &[Row], x_field: &str, y_field: &str, limit: usize) -> Vec<(Cell, Cell)> {
    let mut pairs: Vec<(Cell, Cell)> = rows
        .iter()
        .filter_map(|row| {
            let x = row.get(x_field);
            let y = row.get(y_field);
            if x.is_null() || y.is_null() {
                None
            } else {
                Some((x.clone(), y.clone()))
            }
        })
        .collect();

    pairs.sort_by(|a, b| a.0.sort_cmp(&b.0));
    pairs.truncate(limit);
    pairs
}

/// Five-number summary of the numeric cells of `field`.
pub fn five_number_summary(rows: &[Row], field: &str) -> Option<FiveNumberSummary> {
    summarize(rows.iter().filter_map(|r| r.get(field).as_number()))
}

/// Five-number summary of arbitrary values; non-finite values are ignored.
///
/// Quartiles are read at `floor(p·n)` of the sorted values with no
/// interpolation. Returns `None` when nothing is left after filtering.
pub fn summarize(values: impl IntoIterator<Item = f64>) -> Option<FiveNumberSummary> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let at = |p: f64| sorted[((p * n as f64).floor() as usize).min(n - 1)];

    Some(FiveNumberSummary {
        min: at(0.0),
        q1: at(0.25),
        median: at(0.5),
        q3: at(0.75),
        max: sorted[n - 1],
    })
}

/// Heatmap triples.
///
/// With a `value_field`, each row where `x`/`y` are non-null and the value is
/// numeric yields one triple. Without it, `v` is the number of rows sharing
/// the `(x, y)` pair, in encounter order. Both forms are capped at `limit`.
pub fn heatmap_triples(
    rows: &[Row],
    x_field: &str,
    y_field: &str,
    value_field: Option<&str>,
    limit: usize,
) -> Vec<HeatTriple> {
    let keyed = rows.iter().filter_map(|row| {
        let x = row.get(x_field);
        let y = row.get(y_field);
        if x.is_null() || y.is_null() {
            None
        } else {
            Some((x.label(), y.label(), row))
        }
    });

    match value_field {
        Some(field) => keyed
            .filter_map(|(x, y, row)| row.get(field).as_number().map(|v| HeatTriple { x, y, v }))
            .take(limit)
            .collect(),
        None => {
            let mut seen: HashMap<(String, String), usize> = HashMap::new();
            let mut cells: Vec<HeatTriple> = Vec::new();
            for (x, y, _) in keyed {
                let key = (x, y);
                if let Some(&slot) = seen.get(&key) {
                    cells[slot].v += 1.0;
                } else if cells.len() < limit {
                    seen.insert(key.clone(), cells.len());
                    cells.push(HeatTriple { x: key.0, y: key.1, v: 1.0 });
                }
            }
            cells
        }
    }
}
