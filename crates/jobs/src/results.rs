//! Typed result payloads and the materializer that fetches them.
//!
//! Each analysis kind has its own schema. Unknown fields are ignored so the
//! service can grow its payloads without breaking the client; missing or
//! inconsistent required fields are rejected here, at the boundary.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use adaas_charts::{ChartBuilder, ChartDescriptor, ChartKind, ChartSpec};
use adaas_core::{JobId, Row};

use crate::client::ComputeService;
use crate::error::ResultFetchError;
use crate::types::AnalysisKind;

fn invalid(msg: impl Into<String>) -> ResultFetchError {
    ResultFetchError::Invalid(msg.into())
}

fn same_len(what: &str, left: usize, right: usize) -> Result<(), ResultFetchError> {
    if left != right {
        return Err(invalid(format!("{what}: length {left} does not match {right}")));
    }
    Ok(())
}

fn empty_or_len(what: &str, len: usize, expected: usize) -> Result<(), ResultFetchError> {
    if len == 0 { Ok(()) } else { same_len(what, len, expected) }
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub periods: Vec<String>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub lower_bound: Vec<f64>,
    #[serde(default)]
    pub upper_bound: Vec<f64>,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Historical {
    pub periods: Vec<String>,
    pub actual: Vec<f64>,
    /// In-sample fit; may be shorter than `actual`.
    #[serde(default)]
    pub fitted: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub rmse: f64,
    pub mae: f64,
    #[serde(default)]
    pub mape: Option<f64>,
    #[serde(default)]
    pub aic: Option<f64>,
    #[serde(default)]
    pub bic: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSeriesMetadata {
    #[serde(default)]
    pub date_column: Option<String>,
    #[serde(default)]
    pub value_column: Option<String>,
    #[serde(default)]
    pub n_observations: Option<u64>,
    #[serde(default)]
    pub forecast_periods: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResult {
    pub model_type: String,
    pub forecast: Forecast,
    pub historical: Historical,
    pub metrics: ForecastMetrics,
    #[serde(default)]
    pub metadata: Option<TimeSeriesMetadata>,
}

impl TimeSeriesResult {
    fn validate(&self) -> Result<(), ResultFetchError> {
        let f = &self.forecast;
        same_len("forecast periods/values", f.periods.len(), f.values.len())?;
        empty_or_len("forecast lower_bound", f.lower_bound.len(), f.values.len())?;
        empty_or_len("forecast upper_bound", f.upper_bound.len(), f.values.len())?;
        if !(f.confidence_level > 0.0 && f.confidence_level < 1.0) {
            return Err(invalid(format!("confidence_level {} outside (0, 1)", f.confidence_level)));
        }
        let h = &self.historical;
        same_len("historical periods/actual", h.periods.len(), h.actual.len())?;
        if h.fitted.len() > h.actual.len() {
            return Err(invalid("historical fitted values outnumber actual values"));
        }
        Ok(())
    }

    /// Historical rows (`series = "actual"`) followed by forecast rows
    /// (`series = "forecast"`).
    pub fn rows(&self) -> Vec<Row> {
        let h = &self.historical;
        let historical = h.periods.iter().zip(&h.actual).enumerate().map(|(i, (period, actual))| {
            Row::new()
                .with("period", period.as_str())
                .with("series", "actual")
                .with("value", *actual)
                .with("fitted", h.fitted.get(i).copied().flatten())
        });

        let f = &self.forecast;
        let forecast = f.periods.iter().zip(&f.values).enumerate().map(|(i, (period, value))| {
            Row::new()
                .with("period", period.as_str())
                .with("series", "forecast")
                .with("value", *value)
                .with("lower_bound", f.lower_bound.get(i).copied())
                .with("upper_bound", f.upper_bound.get(i).copied())
        });

        historical.chain(forecast).collect()
    }
}

// ---------------------------------------------------------------------------
// GLM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmModelInfo {
    pub family: String,
    #[serde(default)]
    pub link: Option<String>,
    pub n_observations: u64,
    #[serde(default)]
    pub n_features: Option<u64>,
    #[serde(default)]
    pub n_parameters: Option<u64>,
    #[serde(default)]
    pub converged: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmCoefficient {
    pub feature: String,
    pub coef: f64,
    pub std_err: f64,
    pub z: f64,
    pub p_value: f64,
    pub exp_coef: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    pub aic: f64,
    pub bic: f64,
    pub deviance: f64,
    #[serde(default)]
    pub pearson_chi2: Option<f64>,
    #[serde(default)]
    pub pseudo_r2: Option<f64>,
    #[serde(default)]
    pub null_deviance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub coefficient: f64,
    #[serde(default)]
    pub abs_coefficient: Option<f64>,
    #[serde(default)]
    pub z_score: Option<f64>,
    pub p_value: f64,
    pub importance: f64,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmResult {
    pub model_info: GlmModelInfo,
    pub coefficients: Vec<GlmCoefficient>,
    pub goodness_of_fit: GoodnessOfFit,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
}

impl GlmResult {
    fn validate(&self) -> Result<(), ResultFetchError> {
        if self.coefficients.is_empty() {
            return Err(invalid("GLM result has no coefficients"));
        }
        if let Some(c) = self.coefficients.iter().find(|c| !(0.0..=1.0).contains(&c.p_value)) {
            return Err(invalid(format!("p_value {} of '{}' outside [0, 1]", c.p_value, c.feature)));
        }
        Ok(())
    }

    /// The coefficient table, one row per model term.
    pub fn rows(&self) -> Vec<Row> {
        self.coefficients
            .iter()
            .map(|c| {
                Row::new()
                    .with("feature", c.feature.as_str())
                    .with("coef", c.coef)
                    .with("std_err", c.std_err)
                    .with("z", c.z)
                    .with("p_value", c.p_value)
                    .with("exp_coef", c.exp_coef)
                    .with("ci_lower", c.ci_lower)
                    .with("ci_upper", c.ci_upper)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Survival dashboard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalMeta {
    pub n: u64,
    pub n_events: u64,
    pub n_censored: u64,
    pub median_follow_up: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KaplanMeier {
    pub timeline: Vec<f64>,
    pub survival: Vec<f64>,
    #[serde(default)]
    pub lower_ci: Vec<f64>,
    #[serde(default)]
    pub upper_ci: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeTableRow {
    pub time: f64,
    pub at_risk: u64,
    pub observed: u64,
    pub censored: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NelsonAalen {
    pub timeline: Vec<f64>,
    pub cumhaz: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalResult {
    pub meta: SurvivalMeta,
    pub overall_km: KaplanMeier,
    pub life_table: Vec<LifeTableRow>,
    #[serde(default)]
    pub nelson_aalen: Option<NelsonAalen>,
}

impl SurvivalResult {
    fn validate(&self) -> Result<(), ResultFetchError> {
        let m = &self.meta;
        if m.n_events + m.n_censored != m.n {
            return Err(invalid(format!(
                "events ({}) + censored ({}) != n ({})",
                m.n_events, m.n_censored, m.n
            )));
        }
        let km = &self.overall_km;
        same_len("km timeline/survival", km.timeline.len(), km.survival.len())?;
        empty_or_len("km lower_ci", km.lower_ci.len(), km.timeline.len())?;
        empty_or_len("km upper_ci", km.upper_ci.len(), km.timeline.len())?;
        if let Some(na) = &self.nelson_aalen {
            same_len("nelson_aalen timeline/cumhaz", na.timeline.len(), na.cumhaz.len())?;
        }
        Ok(())
    }

    /// The life table, one row per distinct event time.
    pub fn rows(&self) -> Vec<Row> {
        self.life_table
            .iter()
            .map(|r| {
                Row::new()
                    .with("time", r.time)
                    .with("at_risk", r.at_risk)
                    .with("observed", r.observed)
                    .with("censored", r.censored)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ML survival
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableImportance {
    pub feature: String,
    pub importance: f64,
}

/// Penalised Cox coefficient (coxnet models report these instead of
/// permutation importances).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenalizedCoefficient {
    pub feature: String,
    pub coefficient: f64,
    #[serde(default)]
    pub abs_coefficient: Option<f64>,
}

/// One fitted ML survival model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalModelFit {
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub train_c_index: Option<f64>,
    #[serde(default)]
    pub test_c_index: Option<f64>,
    #[serde(default)]
    pub n_train: Option<u64>,
    #[serde(default)]
    pub n_test: Option<u64>,
    #[serde(default)]
    pub n_features: Option<u64>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub variable_importance: Vec<VariableImportance>,
    #[serde(default)]
    pub coefficients: Vec<PenalizedCoefficient>,
}

impl SurvivalModelFit {
    fn validate(&self) -> Result<(), ResultFetchError> {
        if self.model_type.trim().is_empty() {
            return Err(invalid("ML survival result names no model_type"));
        }
        check_c_index("train_c_index", self.train_c_index)?;
        check_c_index("test_c_index", self.test_c_index)
    }

    /// Feature importances; coxnet coefficients are ranked by magnitude.
    pub fn rows(&self) -> Vec<Row> {
        if !self.variable_importance.is_empty() {
            return self
                .variable_importance
                .iter()
                .map(|v| Row::new().with("feature", v.feature.as_str()).with("importance", v.importance))
                .collect();
        }
        self.coefficients
            .iter()
            .map(|c| {
                Row::new()
                    .with("feature", c.feature.as_str())
                    .with("importance", c.abs_coefficient.unwrap_or(c.coefficient.abs()))
                    .with("coefficient", c.coefficient)
            })
            .collect()
    }
}

/// A model entry in a comparison run: either a fit summary or the error
/// that stopped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedModel {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub test_c_index: Option<f64>,
    /// Cox PH reports its in-sample concordance under this name.
    #[serde(default)]
    pub concordance: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ComparedModel {
    pub fn c_index(&self) -> Option<f64> {
        if self.error.is_some() {
            return None;
        }
        self.test_c_index.or(self.concordance)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonSummary {
    #[serde(default)]
    pub concordance_indices: IndexMap<String, f64>,
    #[serde(default)]
    pub best_model: Option<String>,
    #[serde(default)]
    pub best_c_index: Option<f64>,
}

/// Every candidate model fitted on the same split. `best_model` is `None`
/// when no model produced a concordance index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub models: IndexMap<String, ComparedModel>,
    #[serde(default)]
    pub comparison: ComparisonSummary,
    #[serde(default)]
    pub best_model: Option<String>,
}

impl ModelComparison {
    fn validate(&self) -> Result<(), ResultFetchError> {
        for (name, model) in &self.models {
            check_c_index(name, model.c_index())?;
        }
        for (name, c) in &self.comparison.concordance_indices {
            check_c_index(name, Some(*c))?;
        }
        check_c_index("best_c_index", self.comparison.best_c_index)?;
        if let Some(best) = &self.best_model {
            if !self.models.contains_key(best) {
                return Err(invalid(format!("best_model '{best}' is not among the compared models")));
            }
        }
        Ok(())
    }

    /// Concordance index per model that produced one, in the order the
    /// models were fitted.
    pub fn c_indices(&self) -> Vec<(&str, f64)> {
        self.models
            .iter()
            .filter_map(|(name, model)| {
                let c = self.comparison.concordance_indices.get(name).copied().or_else(|| model.c_index())?;
                Some((name.as_str(), c))
            })
            .collect()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.c_indices()
            .into_iter()
            .map(|(name, c)| Row::new().with("model", name).with("c_index", c))
            .collect()
    }
}

/// The ML survival endpoint returns either a single fit or, for
/// `model_type = compare_all`, a comparison keyed by model name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MlSurvivalResult {
    Single(SurvivalModelFit),
    Comparison(ModelComparison),
}

impl<'de> Deserialize<'de> for MlSurvivalResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        let parsed = if value.get("models").is_some() {
            serde_json::from_value(value).map(MlSurvivalResult::Comparison)
        } else {
            serde_json::from_value(value).map(MlSurvivalResult::Single)
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

impl MlSurvivalResult {
    fn validate(&self) -> Result<(), ResultFetchError> {
        match self {
            MlSurvivalResult::Single(fit) => fit.validate(),
            MlSurvivalResult::Comparison(cmp) => cmp.validate(),
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        match self {
            MlSurvivalResult::Single(fit) => fit.rows(),
            MlSurvivalResult::Comparison(cmp) => cmp.rows(),
        }
    }
}

fn check_c_index(name: &str, c: Option<f64>) -> Result<(), ResultFetchError> {
    match c {
        Some(c) if !(0.0..=1.0).contains(&c) => Err(invalid(format!("{name} c-index {c} outside [0, 1]"))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A decoded, validated analysis result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result")]
pub enum ResultPayload {
    #[serde(rename = "survival")]
    Survival(SurvivalResult),
    #[serde(rename = "glm")]
    Glm(GlmResult),
    #[serde(rename = "timeseries")]
    TimeSeries(TimeSeriesResult),
    #[serde(rename = "ml_survival")]
    MlSurvival(MlSurvivalResult),
}

impl ResultPayload {
    /// Decode `body` against the schema of `kind` and run its semantic checks.
    pub fn decode(kind: AnalysisKind, body: JsonValue) -> Result<Self, ResultFetchError> {
        fn schema<T: serde::de::DeserializeOwned>(body: JsonValue) -> Result<T, ResultFetchError> {
            serde_json::from_value(body).map_err(|e| ResultFetchError::Schema(e.to_string()))
        }

        let payload = match kind {
            AnalysisKind::Survival => ResultPayload::Survival(schema(body)?),
            AnalysisKind::Glm => ResultPayload::Glm(schema(body)?),
            AnalysisKind::TimeSeries => ResultPayload::TimeSeries(schema(body)?),
            AnalysisKind::MlSurvival => ResultPayload::MlSurvival(schema(body)?),
        };
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), ResultFetchError> {
        match self {
            ResultPayload::Survival(r) => r.validate(),
            ResultPayload::Glm(r) => r.validate(),
            ResultPayload::TimeSeries(r) => r.validate(),
            ResultPayload::MlSurvival(r) => r.validate(),
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            ResultPayload::Survival(_) => AnalysisKind::Survival,
            ResultPayload::Glm(_) => AnalysisKind::Glm,
            ResultPayload::TimeSeries(_) => AnalysisKind::TimeSeries,
            ResultPayload::MlSurvival(_) => AnalysisKind::MlSurvival,
        }
    }

    /// Tabular view used for charting.
    pub fn rows(&self) -> Vec<Row> {
        match self {
            ResultPayload::Survival(r) => r.rows(),
            ResultPayload::Glm(r) => r.rows(),
            ResultPayload::TimeSeries(r) => r.rows(),
            ResultPayload::MlSurvival(r) => r.rows(),
        }
    }

    /// Charts that make sense for this kind of result.
    pub fn default_descriptors(&self) -> Vec<ChartDescriptor> {
        match self {
            ResultPayload::TimeSeries(_) => vec![
                ChartDescriptor::new(ChartKind::Line, ["period", "value"]).with_reason("Observed history and forecast"),
            ],
            ResultPayload::Glm(_) => vec![
                ChartDescriptor::new(ChartKind::Bar, ["feature", "coef"]).with_reason("Estimated coefficient per term"),
                ChartDescriptor::new(ChartKind::Scatter, ["coef", "p_value"]).with_reason("Effect size against significance"),
            ],
            ResultPayload::Survival(_) => vec![
                ChartDescriptor::new(ChartKind::Line, ["time", "at_risk"]).with_reason("Population at risk over time"),
                ChartDescriptor::new(ChartKind::Bar, ["time", "observed"]).with_reason("Observed events per time"),
            ],
            ResultPayload::MlSurvival(MlSurvivalResult::Single(_)) => vec![
                ChartDescriptor::new(ChartKind::Bar, ["feature", "importance"]).with_reason("Variable importance"),
            ],
            ResultPayload::MlSurvival(MlSurvivalResult::Comparison(_)) => vec![
                ChartDescriptor::new(ChartKind::Bar, ["model", "c_index"]).with_reason("Concordance index per model"),
            ],
        }
    }

    /// Build every default chart that has data.
    pub fn default_charts(&self, builder: &ChartBuilder) -> Vec<ChartSpec> {
        let rows = self.rows();
        self.default_descriptors()
            .iter()
            .filter_map(|d| builder.build(d, &rows))
            .collect()
    }
}

/// Fetches and validates the result of a succeeded job.
pub struct ResultMaterializer<S: ?Sized> {
    service: Arc<S>,
}

impl<S: ComputeService + ?Sized> ResultMaterializer<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn fetch(&self, job_id: &JobId, kind: AnalysisKind) -> Result<ResultPayload, ResultFetchError> {
        let body = self.service.fetch_result(job_id).await?;
        match ResultPayload::decode(kind, body) {
            Ok(payload) => {
                tracing::info!(job_id = %job_id, kind = %kind, rows = payload.rows().len(), "result materialized");
                Ok(payload)
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, kind = %kind, error = %e, "result rejected");
                Err(e)
            }
        }
    }
}
