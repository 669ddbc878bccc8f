//! Core job types: analysis requests, remote status reports, local job
//! records and the polling policy.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use adaas_core::{DatasetId, DomainError, DomainResult, JobId};

/// Closed set of analyses the compute service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisKind {
    #[serde(rename = "survival")]
    Survival,
    #[serde(rename = "glm")]
    Glm,
    #[serde(rename = "timeseries", alias = "time_series")]
    TimeSeries,
    #[serde(rename = "ml_survival")]
    MlSurvival,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Survival,
        AnalysisKind::Glm,
        AnalysisKind::TimeSeries,
        AnalysisKind::MlSurvival,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Survival => "survival",
            AnalysisKind::Glm => "glm",
            AnalysisKind::TimeSeries => "timeseries",
            AnalysisKind::MlSurvival => "ml_survival",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "survival" => Ok(AnalysisKind::Survival),
            "glm" => Ok(AnalysisKind::Glm),
            "timeseries" | "time_series" => Ok(AnalysisKind::TimeSeries),
            "ml_survival" | "ml-survival" => Ok(AnalysisKind::MlSurvival),
            other => Err(DomainError::validation(format!("unknown analysis kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind options
// ---------------------------------------------------------------------------

fn non_blank(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn non_blank_opt(field: &str, value: Option<&str>) -> DomainResult<()> {
    value.map_or(Ok(()), |v| non_blank(field, v))
}

fn non_blank_list(field: &str, values: Option<&[String]>) -> DomainResult<()> {
    for v in values.unwrap_or_default() {
        non_blank(field, v)?;
    }
    Ok(())
}

/// Kaplan-Meier / Nelson-Aalen / Cox dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalParams {
    #[serde(alias = "datasetId")]
    pub dataset_id: DatasetId,
    #[serde(default, alias = "strataCol", skip_serializing_if = "Option::is_none")]
    pub strata_col: Option<String>,
}

impl SurvivalParams {
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            strata_col: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        non_blank_opt("strata_col", self.strata_col.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlmFamily {
    #[default]
    Auto,
    Poisson,
    #[serde(alias = "negative_binomial")]
    NegativeBinomial,
    Gamma,
}

/// Generalized linear model pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmParams {
    #[serde(alias = "datasetId")]
    pub dataset_id: DatasetId,
    #[serde(default, alias = "targetCol")]
    pub target_col: String,
    #[serde(default)]
    pub family: GlmFamily,
    #[serde(default, alias = "featureCols", skip_serializing_if = "Option::is_none")]
    pub feature_cols: Option<Vec<String>>,
    #[serde(default, alias = "strataCol", skip_serializing_if = "Option::is_none")]
    pub strata_col: Option<String>,
}

impl GlmParams {
    pub fn new(dataset_id: DatasetId, target_col: impl Into<String>) -> Self {
        Self {
            dataset_id,
            target_col: target_col.into(),
            family: GlmFamily::Auto,
            feature_cols: None,
            strata_col: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        non_blank("target_col", &self.target_col)?;
        non_blank_list("feature_cols", self.feature_cols.as_deref())?;
        non_blank_opt("strata_col", self.strata_col.as_deref())?;
        if let Some(features) = &self.feature_cols {
            if features.iter().any(|f| f == &self.target_col) {
                return Err(DomainError::validation(format!(
                    "feature_cols must not contain the target column '{}'",
                    self.target_col
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSeriesModel {
    #[default]
    Auto,
    Arima,
    Sarima,
    HoltWinters,
    Prophet,
}

fn default_forecast_periods() -> u32 {
    12
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Time-series forecasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesParams {
    #[serde(alias = "datasetId")]
    pub dataset_id: DatasetId,
    #[serde(default = "default_forecast_periods", alias = "forecastPeriods")]
    pub forecast_periods: u32,
    #[serde(default, alias = "modelType")]
    pub model_type: TimeSeriesModel,
    #[serde(default = "default_confidence_level", alias = "confidenceLevel")]
    pub confidence_level: f64,
    #[serde(default, alias = "dateCol", skip_serializing_if = "Option::is_none")]
    pub date_col: Option<String>,
    #[serde(default, alias = "valueCol", skip_serializing_if = "Option::is_none")]
    pub value_col: Option<String>,
}

impl TimeSeriesParams {
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            forecast_periods: default_forecast_periods(),
            model_type: TimeSeriesModel::Auto,
            confidence_level: default_confidence_level(),
            date_col: None,
            value_col: None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.forecast_periods == 0 {
            return Err(DomainError::validation("forecast_periods must be a positive integer"));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(DomainError::validation(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        non_blank_opt("date_col", self.date_col.as_deref())?;
        non_blank_opt("value_col", self.value_col.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlSurvivalModel {
    #[default]
    RandomSurvivalForest,
    GradientBoosted,
    Coxnet,
    CompareAll,
}

fn default_time_col() -> String {
    "time".to_string()
}

fn default_event_col() -> String {
    "event".to_string()
}

/// Machine-learning survival model training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlSurvivalParams {
    #[serde(alias = "datasetId")]
    pub dataset_id: DatasetId,
    #[serde(default = "default_time_col", alias = "timeCol")]
    pub time_col: String,
    #[serde(default = "default_event_col", alias = "eventCol")]
    pub event_col: String,
    #[serde(default, alias = "featureCols", skip_serializing_if = "Option::is_none")]
    pub feature_cols: Option<Vec<String>>,
    #[serde(default, alias = "modelType")]
    pub model_type: MlSurvivalModel,
}

impl MlSurvivalParams {
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            time_col: default_time_col(),
            event_col: default_event_col(),
            feature_cols: None,
            model_type: MlSurvivalModel::default(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        non_blank("time_col", &self.time_col)?;
        non_blank("event_col", &self.event_col)?;
        if self.time_col == self.event_col {
            return Err(DomainError::validation("time_col and event_col must differ"));
        }
        non_blank_list("feature_cols", self.feature_cols.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A typed, immutable analysis request.
///
/// Serializes to the submission wire body `{"kind": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params")]
pub enum AnalysisRequest {
    #[serde(rename = "survival")]
    Survival(SurvivalParams),
    #[serde(rename = "glm")]
    Glm(GlmParams),
    #[serde(rename = "timeseries")]
    TimeSeries(TimeSeriesParams),
    #[serde(rename = "ml_survival")]
    MlSurvival(MlSurvivalParams),
}

impl AnalysisRequest {
    /// Build a request from a kind, a dataset and a loosely typed JSON object
    /// of options (snake_case or camelCase keys). The result is validated.
    pub fn from_parts(kind: AnalysisKind, dataset_id: &str, params: JsonValue) -> DomainResult<Self> {
        let mut object = match params {
            JsonValue::Object(map) => map,
            JsonValue::Null => serde_json::Map::new(),
            other => {
                return Err(DomainError::validation(format!(
                    "analysis params must be a JSON object, got {other}"
                )));
            }
        };
        object.remove("datasetId");
        object.insert("dataset_id".to_string(), JsonValue::String(dataset_id.to_string()));
        let body = JsonValue::Object(object);

        let decode_err = |e: serde_json::Error| DomainError::validation(format!("invalid {kind} params: {e}"));
        let request = match kind {
            AnalysisKind::Survival => AnalysisRequest::Survival(serde_json::from_value(body).map_err(decode_err)?),
            AnalysisKind::Glm => AnalysisRequest::Glm(serde_json::from_value(body).map_err(decode_err)?),
            AnalysisKind::TimeSeries => AnalysisRequest::TimeSeries(serde_json::from_value(body).map_err(decode_err)?),
            AnalysisKind::MlSurvival => AnalysisRequest::MlSurvival(serde_json::from_value(body).map_err(decode_err)?),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisRequest::Survival(_) => AnalysisKind::Survival,
            AnalysisRequest::Glm(_) => AnalysisKind::Glm,
            AnalysisRequest::TimeSeries(_) => AnalysisKind::TimeSeries,
            AnalysisRequest::MlSurvival(_) => AnalysisKind::MlSurvival,
        }
    }

    pub fn dataset_id(&self) -> &DatasetId {
        match self {
            AnalysisRequest::Survival(p) => &p.dataset_id,
            AnalysisRequest::Glm(p) => &p.dataset_id,
            AnalysisRequest::TimeSeries(p) => &p.dataset_id,
            AnalysisRequest::MlSurvival(p) => &p.dataset_id,
        }
    }

    /// Check the kind's required-field contract.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            AnalysisRequest::Survival(p) => p.validate(),
            AnalysisRequest::Glm(p) => p.validate(),
            AnalysisRequest::TimeSeries(p) => p.validate(),
            AnalysisRequest::MlSurvival(p) => p.validate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote status
// ---------------------------------------------------------------------------

/// Status string reported by the compute service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Queued,
    #[serde(alias = "started")]
    Running,
    Finished,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Finished | RemoteStatus::Failed)
    }
}

/// Body of `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: RemoteStatus) -> Self {
        Self { status, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Local job record
// ---------------------------------------------------------------------------

/// Client-side job status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Declared by the client after the attempt budget ran out. The job may
    /// still be running remotely.
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut => 2,
        }
    }
}

/// A submitted analysis job, as tracked by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: AnalysisKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Status polls performed so far, including failed ones.
    pub attempts: u32,
}

impl Job {
    pub fn new(id: JobId, kind: AnalysisKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            error: None,
            attempts: 0,
        }
    }

    /// Move to `next` unless that would go backwards or leave a terminal
    /// status. Returns whether the status changed.
    fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() || next == self.status {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn mark_running(&mut self) -> bool {
        self.advance(JobStatus::Running)
    }

    pub fn mark_succeeded(&mut self) -> bool {
        self.advance(JobStatus::Succeeded)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        let changed = self.advance(JobStatus::Failed);
        if changed {
            self.error = Some(error.into());
        }
        changed
    }

    pub fn mark_timed_out(&mut self) -> bool {
        self.advance(JobStatus::TimedOut)
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Poll policy
// ---------------------------------------------------------------------------

/// How a job is polled until it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before each status query
    pub interval: Duration,
    /// Status queries allowed before the client declares a timeout
    pub max_attempts: u32,
    /// Consecutive transport failures tolerated before giving up
    pub max_consecutive_network_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
            max_consecutive_network_failures: 3,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            ..Default::default()
        }
    }

    /// Give up on the first network failure.
    pub fn fail_fast(mut self) -> Self {
        self.max_consecutive_network_failures = 1;
        self
    }

    pub fn with_max_network_failures(mut self, max: u32) -> Self {
        self.max_consecutive_network_failures = max;
        self
    }

    /// Upper bound on time spent polling, ignoring request latency.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.max_attempts == 0 {
            return Err(DomainError::validation("max_attempts must be at least 1"));
        }
        if self.max_consecutive_network_failures == 0 {
            return Err(DomainError::validation(
                "max_consecutive_network_failures must be at least 1",
            ));
        }
        Ok(())
    }
}
