//! Submit → poll → fetch, as one cancellable call.

use std::sync::Arc;

use serde::Serialize;

use adaas_charts::{ChartBuilder, ChartSpec};
use adaas_core::DomainError;

use crate::cancel::CancelToken;
use crate::client::{ComputeService, HttpComputeClient, JobSubmissionClient};
use crate::config::{ClientConfig, ConfigError};
use crate::error::AnalysisError;
use crate::poller::{JobPoller, PollObserver, poll_until_terminal};
use crate::results::{ResultMaterializer, ResultPayload};
use crate::types::{AnalysisRequest, Job, PollPolicy};

/// A succeeded analysis with its validated result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedAnalysis {
    pub job: Job,
    pub payload: ResultPayload,
}

impl CompletedAnalysis {
    pub fn charts(&self, builder: &ChartBuilder) -> Vec<ChartSpec> {
        self.payload.default_charts(builder)
    }
}

/// Runs analyses end to end against one compute service.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    service: Arc<dyn ComputeService>,
    submitter: JobSubmissionClient<dyn ComputeService>,
    materializer: Arc<ResultMaterializer<dyn ComputeService>>,
    policy: PollPolicy,
    observer: Option<Arc<dyn PollObserver>>,
    chart_builder: ChartBuilder,
}

impl AnalysisOrchestrator {
    /// Fails when `policy` could never poll a job to completion.
    pub fn new(service: Arc<dyn ComputeService>, policy: PollPolicy) -> Result<Self, DomainError> {
        policy.validate()?;
        Ok(Self {
            submitter: JobSubmissionClient::new(Arc::clone(&service)),
            materializer: Arc::new(ResultMaterializer::new(Arc::clone(&service))),
            service,
            policy,
            observer: None,
            chart_builder: ChartBuilder::default(),
        })
    }

    /// Orchestrator over HTTP, configured entirely from `config`.
    pub fn from_config(config: ClientConfig) -> Result<Self, ConfigError> {
        let policy = config.poll.clone();
        let chart_builder = ChartBuilder::new(config.chart_limits);
        let client = HttpComputeClient::new(config)?;
        Ok(Self::new(Arc::new(client), policy)?.with_chart_builder(chart_builder))
    }

    pub fn with_observer(mut self, observer: Arc<dyn PollObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_chart_builder(mut self, chart_builder: ChartBuilder) -> Self {
        self.chart_builder = chart_builder;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn chart_builder(&self) -> &ChartBuilder {
        &self.chart_builder
    }

    /// Submit `request`, poll it to a terminal state and fetch its result
    /// exactly once.
    ///
    /// Cancelling `cancel` at any point ends the run with
    /// [`AnalysisError::Cancelled`]. A job that was already accepted by the
    /// service is left to finish remotely.
    pub async fn run(&self, request: AnalysisRequest, cancel: &CancelToken) -> Result<CompletedAnalysis, AnalysisError> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let kind = request.kind();

        let job_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            submitted = self.submitter.submit(&request) => submitted?,
        };

        let poller = JobPoller::new(Job::new(job_id, kind), self.policy.clone());
        let outcome = poll_until_terminal(self.service.as_ref(), poller, cancel, self.observer.as_deref()).await;
        let job = outcome.into_result()?;

        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job.id, "cancelled before result fetch completed");
                return Err(AnalysisError::Cancelled);
            }
            fetched = self.materializer.fetch(&job.id, kind) => fetched?,
        };

        Ok(CompletedAnalysis { job, payload })
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("policy", &self.policy)
            .field("observer", &self.observer.is_some())
            .field("chart_builder", &self.chart_builder)
            .finish_non_exhaustive()
    }
}
