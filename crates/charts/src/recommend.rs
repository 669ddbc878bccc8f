//! Rule-based chart recommendations.
//!
//! Used when no AI recommendation is available. Deterministic: the same
//! dataset always yields the same descriptors, in the same order.

use adaas_core::Dataset;
use serde_json::json;

use crate::descriptor::{ChartDescriptor, ChartKind};

/// Categorical columns with this many distinct values or more are ignored.
const MAX_CATEGORICAL_CARDINALITY: usize = 20;
const MAX_RECOMMENDATIONS: usize = 3;
const MIN_RECOMMENDATIONS: usize = 2;

/// Recommend two or three charts for `dataset`.
pub fn recommend(dataset: &Dataset) -> Vec<ChartDescriptor> {
    let numeric: Vec<&str> = dataset
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| dataset.is_numeric_column(c))
        .collect();
    let categorical: Vec<&str> = dataset
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| !dataset.is_numeric_column(c))
        .filter(|c| (1..MAX_CATEGORICAL_CARDINALITY).contains(&dataset.distinct_count(c)))
        .collect();
    let temporal = dataset.columns.iter().find(|c| {
        let lower = c.to_lowercase();
        lower.contains("date") || lower.contains("time")
    });

    let mut charts = Vec::new();

    if let Some(&num) = numeric.first() {
        charts.push(
            ChartDescriptor::new(ChartKind::Histogram, [num])
                .with_reason(format!(
                    "Distribution analysis of {num} to understand data spread and identify patterns"
                ))
                .with_param("bins", json!(20))
                .with_param("orientation", json!("vertical")),
        );
    }

    if let (Some(&cat), Some(&num)) = (categorical.first(), numeric.first()) {
        charts.push(
            ChartDescriptor::new(ChartKind::Bar, [cat, num])
                .with_reason(format!("Compare {num} across different {cat} categories"))
                .with_param("orientation", json!("vertical")),
        );
    }

    if let [first, second, ..] = numeric[..] {
        charts.push(
            ChartDescriptor::new(ChartKind::Scatter, [first, second])
                .with_reason(format!("Explore relationship between {first} and {second}")),
        );
    }

    if let (Some(&cat), true) = (categorical.first(), numeric.is_empty()) {
        charts.push(
            ChartDescriptor::new(ChartKind::Bar, [cat])
                .with_reason(format!("Frequency distribution of {cat} categories"))
                .with_param("orientation", json!("vertical")),
        );
    }

    if let (Some(time), Some(&num)) = (temporal, numeric.first()) {
        charts.push(
            ChartDescriptor::new(ChartKind::Line, [time.as_str(), num])
                .with_reason(format!("Trend analysis of {num} over {time}")),
        );
    }

    charts.truncate(MAX_RECOMMENDATIONS);

    if charts.len() < MIN_RECOMMENDATIONS && numeric.len() >= 2 {
        charts.push(
            ChartDescriptor::new(ChartKind::Boxplot, [numeric[0], numeric[1]])
                .with_reason("Statistical summary and outlier detection for numeric variables"),
        );
    }

    let first_column = dataset.columns.first().map(String::as_str);

    if let (true, Some(col)) = (charts.is_empty(), first_column) {
        charts.push(
            ChartDescriptor::new(ChartKind::Bar, [col])
                .with_reason("Basic frequency distribution of the first column")
                .with_param("orientation", json!("vertical")),
        );
    }

    if charts.len() < MIN_RECOMMENDATIONS {
        charts.push(
            ChartDescriptor::new(ChartKind::Histogram, [first_column.unwrap_or("value")])
                .with_reason("Additional data distribution visualization")
                .with_param("bins", json!(15)),
        );
    }

    tracing::debug!(count = charts.len(), "fallback chart recommendations");
    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaas_core::Row;

    fn kinds(charts: &[ChartDescriptor]) -> Vec<ChartKind> {
        charts.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn mixed_dataset_gets_histogram_bar_scatter() {
        let ds = Dataset::from_rows(vec![
            Row::new().with("region", "A").with("claim", 100.0).with("age", 30),
            Row::new().with("region", "B").with("claim", 250.0).with("age", 40),
        ]);
        let charts = recommend(&ds);
        assert_eq!(kinds(&charts), vec![ChartKind::Histogram, ChartKind::Bar, ChartKind::Scatter]);
        assert_eq!(charts[0].fields, vec!["claim"]);
        assert_eq!(charts[0].bins(), Some(20));
        assert_eq!(charts[1].fields, vec!["region", "claim"]);
        assert_eq!(charts[1].reason, "Compare claim across different region categories");
        assert_eq!(charts[2].fields, vec!["claim", "age"]);
    }

    #[test]
    fn first_columns_follow_source_order() {
        let ds: Dataset = serde_json::from_value(json!([
            {"zone": "N", "premium": 12.5, "age": 41},
            {"zone": "S", "premium": 9.0, "age": 35}
        ]))
        .unwrap();
        let charts = recommend(&ds);
        assert_eq!(charts[0].fields, vec!["premium"]);
        assert_eq!(charts[1].fields, vec!["zone", "premium"]);
        assert_eq!(charts[2].fields, vec!["premium", "age"]);
    }

    #[test]
    fn categorical_only_gets_counts_plus_padding() {
        let ds = Dataset::from_rows(vec![Row::new().with("region", "A"), Row::new().with("region", "B")]);
        let charts = recommend(&ds);
        assert_eq!(kinds(&charts), vec![ChartKind::Bar, ChartKind::Histogram]);
        assert_eq!(charts[1].bins(), Some(15));
        assert_eq!(charts[1].fields, vec!["region"]);
    }

    #[test]
    fn single_numeric_with_date_gets_line() {
        let ds = Dataset::new(
            vec!["Policy_Date".into(), "amount".into()],
            vec![
                Row::new().with("Policy_Date", "2024-01-01").with("amount", 1.0),
                Row::new().with("Policy_Date", "2024-02-01").with("amount", 2.0),
            ],
        );
        let charts = recommend(&ds);
        // Policy_Date is also categorical (2 distinct), so the bar wins a slot.
        assert_eq!(kinds(&charts), vec![ChartKind::Histogram, ChartKind::Bar, ChartKind::Line]);
        assert_eq!(charts[2].fields, vec!["Policy_Date", "amount"]);
    }

    #[test]
    fn two_numeric_columns_need_no_padding() {
        let ds = Dataset::from_rows(vec![Row::new().with("a", 1.0).with("b", 2.0)]);
        assert_eq!(kinds(&recommend(&ds)), vec![ChartKind::Histogram, ChartKind::Scatter]);
    }

    #[test]
    fn high_cardinality_text_is_not_categorical() {
        let rows: Vec<Row> = (0..25).map(|i| Row::new().with("id", format!("p{i}"))).collect();
        let charts = recommend(&Dataset::from_rows(rows));
        assert_eq!(kinds(&charts), vec![ChartKind::Bar, ChartKind::Histogram]);
        assert_eq!(charts[0].reason, "Basic frequency distribution of the first column");
    }

    #[test]
    fn empty_dataset_still_recommends() {
        let charts = recommend(&Dataset::default());
        assert_eq!(kinds(&charts), vec![ChartKind::Histogram]);
        assert_eq!(charts[0].fields, vec!["value"]);
    }

    #[test]
    fn recommendations_are_deterministic() {
        let ds = Dataset::from_rows(vec![Row::new().with("x", 1.0).with("y", "k")]);
        assert_eq!(recommend(&ds), recommend(&ds));
    }
}
