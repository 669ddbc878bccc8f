//! Talking to the compute service.
//!
//! [`ComputeService`] is the seam: [`HttpComputeClient`] speaks the real wire
//! protocol, tests substitute scripted fakes. [`JobSubmissionClient`] adds
//! client-side validation in front of any service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use adaas_core::JobId;

use crate::config::{ClientConfig, ConfigError};
use crate::error::{PollNetworkError, ResultFetchError, SubmissionError};
use crate::types::{AnalysisRequest, StatusReport};

/// The three remote operations of the job protocol.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Enqueue an analysis. The request has already been validated.
    async fn submit(&self, request: &AnalysisRequest) -> Result<JobId, SubmissionError>;

    /// Query the current status of a job.
    async fn status(&self, job_id: &JobId) -> Result<StatusReport, PollNetworkError>;

    /// Fetch the raw result document of a finished job.
    async fn fetch_result(&self, job_id: &JobId) -> Result<JsonValue, ResultFetchError>;
}

/// Validates requests and submits them; never blocks on completion.
pub struct JobSubmissionClient<S: ?Sized> {
    service: Arc<S>,
}

impl<S: ComputeService + ?Sized> JobSubmissionClient<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Submit `request`, returning the id the service assigned.
    ///
    /// Invalid requests fail with [`SubmissionError::Invalid`] and never reach
    /// the network.
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<JobId, SubmissionError> {
        request.validate()?;
        let kind = request.kind();
        match self.service.submit(request).await {
            Ok(job_id) => {
                tracing::info!(job_id = %job_id, kind = %kind, dataset_id = %request.dataset_id(), "analysis submitted");
                Ok(job_id)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "analysis submission failed");
                Err(e)
            }
        }
    }
}

impl<S: ?Sized> Clone for JobSubmissionClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "jobId")]
    job_id: String,
}

/// `reqwest`-backed implementation of the job protocol.
#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpComputeClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Extract a human-readable message from an error response body.
///
/// The service answers errors with `{"detail": ...}` where `detail` is a
/// string or, for request validation failures, a list of objects.
fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            JsonValue::String(s) => s,
            other => other.to_string(),
        });
    match detail {
        Some(d) => d,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.canonical_reason().unwrap_or("unknown error").to_string(),
    }
}

#[async_trait]
impl ComputeService for HttpComputeClient {
    async fn submit(&self, request: &AnalysisRequest) -> Result<JobId, SubmissionError> {
        let url = self.config.url("jobs");
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }

        let body: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| SubmissionError::Network(format!("malformed submission response: {e}")))?;
        JobId::new(body.job_id).map_err(|e| SubmissionError::Network(format!("service returned {e}")))
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusReport, PollNetworkError> {
        let url = self.config.url(&format!("jobs/{job_id}"));
        tracing::debug!(job_id = %job_id, "querying job status");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PollNetworkError::new(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PollNetworkError::new(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_detail(status, &body)
            )));
        }

        resp.json::<StatusReport>()
            .await
            .map_err(|e| PollNetworkError::new(format!("malformed status response: {e}")))
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<JsonValue, ResultFetchError> {
        let url = self.config.url(&format!("results/{job_id}"));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResultFetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResultFetchError::Expired(job_id.clone()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ResultFetchError::Http {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ResultFetchError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ResultFetchError::Schema(e.to_string()))
    }
}
