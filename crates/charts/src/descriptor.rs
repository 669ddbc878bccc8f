//! Chart descriptors: what to draw, independent of the data.

use std::collections::BTreeMap;
use std::str::FromStr;

use adaas_core::DomainError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::spec::Orientation;

/// Closed set of chart kinds the builder knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    /// Rendered exactly like [`ChartKind::Bar`].
    Histogram,
    Scatter,
    Line,
    Boxplot,
    Heatmap,
    Pie,
}

impl ChartKind {
    pub const ALL: [ChartKind; 7] = [
        ChartKind::Bar,
        ChartKind::Histogram,
        ChartKind::Scatter,
        ChartKind::Line,
        ChartKind::Boxplot,
        ChartKind::Heatmap,
        ChartKind::Pie,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Histogram => "histogram",
            ChartKind::Scatter => "scatter",
            ChartKind::Line => "line",
            ChartKind::Boxplot => "boxplot",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Pie => "pie",
        }
    }

    /// Capitalised name used in chart titles.
    pub fn display_name(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar",
            ChartKind::Histogram => "Histogram",
            ChartKind::Scatter => "Scatter",
            ChartKind::Line => "Line",
            ChartKind::Boxplot => "Boxplot",
            ChartKind::Heatmap => "Heatmap",
            ChartKind::Pie => "Pie",
        }
    }

    /// Minimum number of fields a descriptor of this kind must name.
    pub fn min_fields(&self) -> usize {
        match self {
            ChartKind::Bar | ChartKind::Histogram | ChartKind::Pie | ChartKind::Boxplot => 1,
            ChartKind::Scatter | ChartKind::Line | ChartKind::Heatmap => 2,
        }
    }
}

impl core::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ChartKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown chart type '{s}'")))
    }
}

/// A declarative request for a chart.
///
/// Produced upstream (AI recommendation, the fallback recommender or a user
/// pick) and never mutated by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDescriptor {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub fields: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub params: BTreeMap<String, JsonValue>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, JsonValue>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChartDescriptor {
    pub fn new<I, S>(kind: ChartKind, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            fields: fields.into_iter().map(Into::into).collect(),
            reason: String::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// `"{Kind}: {fields joined by ' vs '}"`.
    pub fn title(&self) -> String {
        format!("{}: {}", self.kind.display_name(), self.fields.join(" vs "))
    }

    pub fn orientation(&self) -> Orientation {
        match self.params.get("orientation").and_then(JsonValue::as_str) {
            Some("horizontal") => Orientation::Horizontal,
            _ => Orientation::Vertical,
        }
    }

    /// Bin-count hint; only positive integers are honoured.
    pub fn bins(&self) -> Option<u32> {
        self.params
            .get("bins")
            .and_then(JsonValue::as_u64)
            .filter(|b| *b > 0)
            .and_then(|b| u32::try_from(b).ok())
    }
}

/// Parse a JSON array of descriptors, dropping entries that are malformed or
/// name a chart kind outside the supported set.
///
/// Recommendation sources are not trusted to stay inside the closed set, so
/// bad entries are logged and skipped instead of failing the whole batch.
pub fn parse_descriptors(value: &JsonValue) -> Vec<ChartDescriptor> {
    let Some(items) = value.as_array() else {
        tracing::warn!("chart recommendations are not a JSON array; ignoring");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            match serde_json::from_value::<ChartDescriptor>(item.clone()) {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::warn!(index = idx, error = %e, "skipping chart descriptor");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_round_trips_through_its_name() {
        for kind in ChartKind::ALL {
            assert_eq!(kind.as_str().parse::<ChartKind>().unwrap(), kind);
        }
        assert_eq!(" Scatter ".parse::<ChartKind>().unwrap(), ChartKind::Scatter);
        assert!("radar".parse::<ChartKind>().is_err());
    }

    #[test]
    fn title_joins_fields() {
        let d = ChartDescriptor::new(ChartKind::Scatter, ["age", "claim_amount"]);
        assert_eq!(d.title(), "Scatter: age vs claim_amount");
    }

    #[test]
    fn deserializes_recommendation_shape() {
        let d: ChartDescriptor = serde_json::from_value(json!({
            "type": "histogram",
            "fields": ["age"],
            "reason": "Distribution of age",
            "params": {"bins": 20, "orientation": "horizontal"}
        }))
        .unwrap();
        assert_eq!(d.kind, ChartKind::Histogram);
        assert_eq!(d.bins(), Some(20));
        assert_eq!(d.orientation(), Orientation::Horizontal);
    }

    #[test]
    fn null_params_and_missing_reason_are_tolerated() {
        let d: ChartDescriptor =
            serde_json::from_value(json!({"type": "bar", "fields": ["x"], "params": null})).unwrap();
        assert!(d.params.is_empty());
        assert!(d.reason.is_empty());
        assert_eq!(d.orientation(), Orientation::Vertical);
        assert_eq!(d.bins(), None);
    }

    #[test]
    fn parse_descriptors_skips_unknown_kinds() {
        let parsed = parse_descriptors(&json!([
            {"type": "bar", "fields": ["region"]},
            {"type": "radar", "fields": ["a", "b"]},
            {"fields": ["no_type"]},
            {"type": "line", "fields": ["date", "value"], "reason": "trend"}
        ]));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, ChartKind::Bar);
        assert_eq!(parsed[1].kind, ChartKind::Line);
    }

    #[test]
    fn parse_descriptors_rejects_non_arrays() {
        assert!(parse_descriptors(&json!({"type": "bar"})).is_empty());
    }
}
