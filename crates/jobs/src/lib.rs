//! `adaas-jobs`
//!
//! **Responsibility:** the asynchronous job lifecycle against the ADaaS
//! compute service: validate and submit an analysis, poll it to a terminal
//! state, fetch and validate its result.
//!
//! Layering, bottom up:
//! - [`types`]: requests, remote statuses, local job records, poll policy
//! - [`client`]: the [`ComputeService`] seam and its HTTP implementation
//! - [`poller`]: a pure polling state machine plus its async driver
//! - [`results`]: typed per-kind result schemas
//! - [`orchestrator`] / [`tracker`]: submit → poll → fetch for one or many jobs

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod results;
pub mod tracker;
pub mod types;

pub use cancel::CancelToken;
pub use client::{ComputeService, HttpComputeClient, JobSubmissionClient};
pub use config::{ClientConfig, ConfigError};
pub use error::{AnalysisError, PollNetworkError, ResultFetchError, SubmissionError};
pub use orchestrator::{AnalysisOrchestrator, CompletedAnalysis};
pub use poller::{
    JobPoller, Observation, ObservationRejected, PollFailure, PollObserver, PollOutcome, PollState, Transition,
    poll_until_terminal,
};
pub use results::{ResultMaterializer, ResultPayload};
pub use tracker::{AnalysisOutcome, JobTracker, TrackingId};
pub use types::{
    AnalysisKind, AnalysisRequest, GlmFamily, GlmParams, Job, JobStatus, MlSurvivalModel, MlSurvivalParams,
    PollPolicy, RemoteStatus, StatusReport, SurvivalParams, TimeSeriesModel, TimeSeriesParams,
};
