//! Tabular values: cells, rows and datasets.
//!
//! A dataset is an ordered sequence of rows that *usually* share a column set.
//! Nothing here enforces that: a missing key reads as [`Cell::Null`].

use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A single tabular value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    Number(f64),
    Text(String),
    #[default]
    Null,
}

static NULL_CELL: Cell = Cell::Null;

impl Cell {
    /// Convert an arbitrary JSON value into a cell.
    ///
    /// Booleans become `1`/`0`; arrays and objects are kept as compact JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Cell::Null,
            JsonValue::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            JsonValue::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Null),
            JsonValue::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// The numeric value, if this cell holds a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Display label used as a grouping key and axis tick.
    ///
    /// Integral numbers print without a fractional part, so `3.0` and `3`
    /// land in the same category.
    pub fn label(&self) -> String {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Null => "null".to_string(),
        }
    }

    /// Total order used when sorting series: numbers (by value) before text
    /// (lexicographic) before nulls.
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        fn rank(c: &Cell) -> u8 {
            match c {
                Cell::Number(_) => 0,
                Cell::Text(_) => 1,
                Cell::Null => 2,
            }
        }
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(f64::from(value))
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Cell::Number(_) | Cell::Null => serializer.serialize_unit(),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(Cell::from_json(&value))
    }
}

/// A mapping from column name to cell, in insertion (source) order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Cell>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Cell>) {
        self.0.insert(column.into(), value.into());
    }

    /// The cell under `column`, or [`Cell::Null`] when the key is missing.
    pub fn get(&self, column: &str) -> &Cell {
        self.0.get(column).unwrap_or(&NULL_CELL)
    }

    /// Column names in the order they were first inserted or read.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// An ordered row set plus its column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a dataset whose columns are the union of row keys, first seen first.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for row in &rows {
            for col in row.columns() {
                if seen.insert(col.to_string()) {
                    columns.push(col.to_string());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate the cells of one column in row order (missing keys read as null).
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Cell> + 'a {
        self.rows.iter().map(move |r| r.get(name))
    }

    /// A column is numeric when it has at least one number and every
    /// non-null cell is a number.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        let mut any = false;
        for cell in self.column(name) {
            match cell {
                Cell::Null => {}
                Cell::Number(_) => any = true,
                Cell::Text(_) => return false,
            }
        }
        any
    }

    /// Number of distinct non-null labels in a column.
    pub fn distinct_count(&self, name: &str) -> usize {
        self.column(name)
            .filter(|c| !c.is_null())
            .map(Cell::label)
            .collect::<HashSet<_>>()
            .len()
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Table { columns: Vec<String>, rows: Vec<Row> },
            Rows(Vec<Row>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Table { columns, rows } => Dataset::new(columns, rows),
            Repr::Rows(rows) => Dataset::from_rows(rows),
        })
    }
}
