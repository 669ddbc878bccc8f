//! Error types, one per layer of the job lifecycle.

use adaas_core::{DomainError, JobId};
use thiserror::Error;

/// Submission failed; no job exists and nothing will be polled.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmissionError {
    /// Rejected client-side before any network call.
    #[error("invalid request: {0}")]
    Invalid(#[from] DomainError),
    /// The service answered with a non-success status.
    #[error("submission rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("network error during submission: {0}")]
    Network(String),
}

/// A single status query failed to produce a usable report.
///
/// Transient by nature: the poller counts it as a missed attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("status poll failed: {message}")]
pub struct PollNetworkError {
    pub message: String,
}

impl PollNetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The result of a succeeded job could not be retrieved or trusted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResultFetchError {
    /// The service no longer has (or never had) a result for this job.
    #[error("result for job {0} is not available")]
    Expired(JobId),
    #[error("result fetch failed ({status}): {detail}")]
    Http { status: u16, detail: String },
    #[error("network error fetching result: {0}")]
    Network(String),
    /// Body was not JSON or did not match the expected schema.
    #[error("result does not match the expected schema: {0}")]
    Schema(String),
    /// Body decoded but failed a semantic check.
    #[error("result failed validation: {0}")]
    Invalid(String),
}

/// Caller-visible outcome of an orchestrated analysis that did not succeed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("job failed: {message}")]
    JobFailed { message: String },
    #[error("lost contact with the compute service after {consecutive} failed polls: {message}")]
    PollNetwork { message: String, consecutive: u32 },
    #[error("job did not finish within {attempts} polls")]
    TimedOut { attempts: u32 },
    #[error(transparent)]
    ResultFetch(#[from] ResultFetchError),
    #[error("analysis was cancelled")]
    Cancelled,
    /// The task running the analysis panicked or was aborted.
    #[error("analysis task aborted: {0}")]
    Aborted(String),
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_remote_detail() {
        let err = SubmissionError::Rejected {
            status: 404,
            detail: "Dataset claims not found".into(),
        };
        assert_eq!(err.to_string(), "submission rejected (404): Dataset claims not found");

        let wrapped: AnalysisError = err.into();
        assert!(wrapped.to_string().contains("Dataset claims not found"));
    }

    #[test]
    fn domain_errors_become_invalid_submissions() {
        let err: SubmissionError = DomainError::validation("target_col must not be empty").into();
        assert!(matches!(err, SubmissionError::Invalid(_)));
    }
}
