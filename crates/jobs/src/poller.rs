//! Job polling: a pure state machine plus the async loop that feeds it.
//!
//! [`JobPoller`] never touches the network or the clock. It consumes
//! [`Observation`]s and yields [`Transition`]s. [`poll_until_terminal`] owns
//! the timer, issues one status query at a time and stops as soon as the
//! poller reaches a terminal state or the caller cancels.

use thiserror::Error;

use adaas_core::JobId;

use crate::cancel::CancelToken;
use crate::client::ComputeService;
use crate::error::{AnalysisError, PollNetworkError};
use crate::types::{Job, PollPolicy, RemoteStatus, StatusReport};

/// One result of a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Status(StatusReport),
    NetworkError(PollNetworkError),
}

impl From<Result<StatusReport, PollNetworkError>> for Observation {
    fn from(result: Result<StatusReport, PollNetworkError>) -> Self {
        match result {
            Ok(report) => Observation::Status(report),
            Err(e) => Observation::NetworkError(e),
        }
    }
}

/// Why polling ended in failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// The service reported the job as failed.
    Remote { message: String },
    /// Too many status queries in a row failed.
    Network { message: String, consecutive: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling,
    Succeeded,
    Failed(PollFailure),
    TimedOut,
    /// Caller-driven exit.
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Submitted | PollState::Polling)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PollState::Submitted => "submitted",
            PollState::Polling => "polling",
            PollState::Succeeded => "succeeded",
            PollState::Failed(_) => "failed",
            PollState::TimedOut => "timed_out",
            PollState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A state change produced by one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: PollState,
    pub to: PollState,
    /// 1-based index of the poll that caused it.
    pub attempt: u32,
}

/// An observation arrived after polling had already ended.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("job {job_id} is already {state}; observation rejected")]
pub struct ObservationRejected {
    pub job_id: JobId,
    pub state: &'static str,
}

/// Pure polling state machine for one job.
#[derive(Debug, Clone)]
pub struct JobPoller {
    job: Job,
    policy: PollPolicy,
    state: PollState,
    consecutive_network_failures: u32,
}

impl JobPoller {
    pub fn new(job: Job, policy: PollPolicy) -> Self {
        Self {
            job,
            policy,
            state: PollState::Submitted,
            consecutive_network_failures: 0,
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.job.attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply one observation.
    ///
    /// Every accepted observation counts as an attempt and yields exactly one
    /// transition (possibly `Polling → Polling`). Once terminal, further
    /// observations are rejected and leave the poller untouched.
    pub fn observe(&mut self, observation: Observation) -> Result<Transition, ObservationRejected> {
        if self.state.is_terminal() {
            return Err(ObservationRejected {
                job_id: self.job.id.clone(),
                state: self.state.name(),
            });
        }

        self.job.record_attempt();
        let attempt = self.job.attempts;

        let next = match observation {
            Observation::Status(report) => {
                self.consecutive_network_failures = 0;
                match report.status {
                    RemoteStatus::Finished => {
                        self.job.mark_succeeded();
                        PollState::Succeeded
                    }
                    RemoteStatus::Failed => {
                        let message = report.error.unwrap_or_else(|| "job failed without an error message".to_string());
                        self.job.mark_failed(message.clone());
                        PollState::Failed(PollFailure::Remote { message })
                    }
                    RemoteStatus::Running => {
                        self.job.mark_running();
                        self.still_pending(attempt)
                    }
                    RemoteStatus::Queued => self.still_pending(attempt),
                }
            }
            Observation::NetworkError(err) => {
                self.consecutive_network_failures += 1;
                let consecutive = self.consecutive_network_failures;
                tracing::warn!(
                    job_id = %self.job.id,
                    attempt,
                    consecutive,
                    error = %err.message,
                    "status poll failed"
                );
                if consecutive >= self.policy.max_consecutive_network_failures {
                    self.job.mark_failed(err.message.clone());
                    PollState::Failed(PollFailure::Network {
                        message: err.message,
                        consecutive,
                    })
                } else {
                    self.still_pending(attempt)
                }
            }
        };

        let from = std::mem::replace(&mut self.state, next.clone());
        if next.is_terminal() {
            tracing::info!(job_id = %self.job.id, attempt, state = %next, "polling finished");
        } else {
            tracing::debug!(job_id = %self.job.id, attempt, status = ?self.job.status, "job still pending");
        }

        Ok(Transition { from, to: next, attempt })
    }

    fn still_pending(&mut self, attempt: u32) -> PollState {
        if attempt >= self.policy.max_attempts {
            self.job.mark_timed_out();
            PollState::TimedOut
        } else {
            PollState::Polling
        }
    }

    /// Stop polling on the caller's behalf. Returns `false` if the poller
    /// had already reached a terminal state.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        tracing::info!(job_id = %self.job.id, attempts = self.job.attempts, "polling cancelled");
        self.state = PollState::Cancelled;
        true
    }

    pub fn into_outcome(self) -> PollOutcome {
        PollOutcome {
            job: self.job,
            state: self.state,
        }
    }
}

/// Receives every transition of a polled job.
pub trait PollObserver: Send + Sync {
    fn on_transition(&self, job: &Job, transition: &Transition);
}

impl<F> PollObserver for F
where
    F: Fn(&Job, &Transition) + Send + Sync,
{
    fn on_transition(&self, job: &Job, transition: &Transition) {
        self(job, transition)
    }
}

/// Final state of a polling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub job: Job,
    pub state: PollState,
}

impl PollOutcome {
    /// `Ok(job)` for a succeeded job, the matching [`AnalysisError`] otherwise.
    pub fn into_result(self) -> Result<Job, AnalysisError> {
        match self.state {
            PollState::Succeeded => Ok(self.job),
            PollState::Failed(PollFailure::Remote { message }) => Err(AnalysisError::JobFailed { message }),
            PollState::Failed(PollFailure::Network { message, consecutive }) => {
                Err(AnalysisError::PollNetwork { message, consecutive })
            }
            PollState::TimedOut => Err(AnalysisError::TimedOut {
                attempts: self.job.attempts,
            }),
            PollState::Cancelled => Err(AnalysisError::Cancelled),
            state @ (PollState::Submitted | PollState::Polling) => Err(AnalysisError::Aborted(format!(
                "polling stopped while {state}"
            ))),
        }
    }
}

/// Drive `poller` against `service` until it is terminal or `cancel` fires.
///
/// The first query goes out one interval after the call. Queries are strictly
/// sequential. After cancellation no query is issued, no transition is
/// applied and the observer is not called; a response already in flight is
/// dropped.
pub async fn poll_until_terminal<S>(
    service: &S,
    mut poller: JobPoller,
    cancel: &CancelToken,
    observer: Option<&dyn PollObserver>,
) -> PollOutcome
where
    S: ComputeService + ?Sized,
{
    let interval = poller.policy().interval;
    let job_id = poller.job().id.clone();

    while !poller.is_terminal() {
        if cancel.is_cancelled() {
            poller.cancel();
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                poller.cancel();
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let observation: Observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                poller.cancel();
                break;
            }
            result = service.status(&job_id) => result.into(),
        };

        if cancel.is_cancelled() {
            poller.cancel();
            break;
        }

        match poller.observe(observation) {
            Ok(transition) => {
                if let Some(observer) = observer {
                    observer.on_transition(poller.job(), &transition);
                }
            }
            Err(rejected) => {
                tracing::warn!(error = %rejected, "unexpected observation");
                break;
            }
        }
    }

    poller.into_outcome()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisKind;
    use std::time::Duration;

    fn poller(policy: PollPolicy) -> JobPoller {
        JobPoller::new(
            Job::new(JobId::new("job_0badf00d").unwrap(), AnalysisKind::TimeSeries),
            policy,
        )
    }

    fn status(s: RemoteStatus) -> Observation {
        Observation::Status(StatusReport::new(s))
    }

    fn net() -> Observation {
        Observation::NetworkError(PollNetworkError::new("connection refused"))
    }

    #[test]
    fn queued_queued_running_finished() {
        let mut p = poller(PollPolicy::default());
        let states: Vec<(PollState, PollState)> = [
            RemoteStatus::Queued,
            RemoteStatus::Queued,
            RemoteStatus::Running,
            RemoteStatus::Finished,
        ]
        .into_iter()
        .map(|s| {
            let t = p.observe(status(s)).unwrap();
            (t.from, t.to)
        })
        .collect();

        assert_eq!(
            states,
            vec![
                (PollState::Submitted, PollState::Polling),
                (PollState::Polling, PollState::Polling),
                (PollState::Polling, PollState::Polling),
                (PollState::Polling, PollState::Succeeded),
            ]
        );
        assert_eq!(p.attempts(), 4);
        assert_eq!(p.job().status, crate::types::JobStatus::Succeeded);
    }

    #[test]
    fn failure_carries_service_message() {
        let mut p = poller(PollPolicy::default());
        p.observe(status(RemoteStatus::Running)).unwrap();
        let t = p.observe(Observation::Status(StatusReport::failed("No time column"))).unwrap();
        assert_eq!(
            t.to,
            PollState::Failed(PollFailure::Remote {
                message: "No time column".into()
            })
        );
        assert_eq!(p.job().error.as_deref(), Some("No time column"));
    }

    #[test]
    fn observations_after_terminal_are_rejected() {
        let mut p = poller(PollPolicy::default());
        p.observe(status(RemoteStatus::Finished)).unwrap();
        let err = p.observe(status(RemoteStatus::Failed)).unwrap_err();
        assert_eq!(err.state, "succeeded");
        assert_eq!(p.state(), &PollState::Succeeded);
        assert_eq!(p.attempts(), 1);
    }

    #[test]
    fn times_out_on_the_last_allowed_attempt() {
        let mut p = poller(PollPolicy::new(Duration::from_secs(1), 3));
        assert_eq!(p.observe(status(RemoteStatus::Queued)).unwrap().to, PollState::Polling);
        assert_eq!(p.observe(status(RemoteStatus::Queued)).unwrap().to, PollState::Polling);
        assert_eq!(p.observe(status(RemoteStatus::Queued)).unwrap().to, PollState::TimedOut);
        assert_eq!(p.job().status, crate::types::JobStatus::TimedOut);
    }

    #[test]
    fn terminal_status_on_the_last_attempt_wins() {
        let mut p = poller(PollPolicy::new(Duration::from_secs(1), 2));
        p.observe(status(RemoteStatus::Queued)).unwrap();
        assert_eq!(p.observe(status(RemoteStatus::Finished)).unwrap().to, PollState::Succeeded);
    }

    #[test]
    fn network_failures_escalate_after_threshold() {
        let mut p = poller(PollPolicy::default());
        assert_eq!(p.observe(net()).unwrap().to, PollState::Polling);
        assert_eq!(p.observe(net()).unwrap().to, PollState::Polling);
        let t = p.observe(net()).unwrap();
        assert_eq!(
            t.to,
            PollState::Failed(PollFailure::Network {
                message: "connection refused".into(),
                consecutive: 3
            })
        );
    }

    #[test]
    fn a_good_status_resets_the_network_counter() {
        let mut p = poller(PollPolicy::default());
        p.observe(net()).unwrap();
        p.observe(net()).unwrap();
        p.observe(status(RemoteStatus::Running)).unwrap();
        p.observe(net()).unwrap();
        assert_eq!(p.observe(net()).unwrap().to, PollState::Polling);
        assert_eq!(p.attempts(), 5);
    }

    #[test]
    fn fail_fast_policy_stops_on_first_network_error() {
        let mut p = poller(PollPolicy::default().fail_fast());
        assert!(matches!(p.observe(net()).unwrap().to, PollState::Failed(PollFailure::Network { .. })));
    }

    #[test]
    fn network_misses_count_towards_timeout() {
        let mut p = poller(PollPolicy::new(Duration::from_secs(1), 2).with_max_network_failures(10));
        p.observe(net()).unwrap();
        assert_eq!(p.observe(net()).unwrap().to, PollState::TimedOut);
    }

    #[test]
    fn cancel_only_before_terminal() {
        let mut p = poller(PollPolicy::default());
        p.observe(status(RemoteStatus::Queued)).unwrap();
        assert!(p.cancel());
        assert!(p.observe(status(RemoteStatus::Finished)).is_err());
        assert_eq!(p.into_outcome().into_result(), Err(AnalysisError::Cancelled));

        let mut done = poller(PollPolicy::default());
        done.observe(status(RemoteStatus::Finished)).unwrap();
        assert!(!done.cancel());
    }

    #[test]
    fn outcomes_map_to_analysis_errors() {
        let mut p = poller(PollPolicy::new(Duration::from_secs(1), 1));
        p.observe(status(RemoteStatus::Running)).unwrap();
        assert_eq!(p.into_outcome().into_result(), Err(AnalysisError::TimedOut { attempts: 1 }));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn non_terminal() -> impl Strategy<Value = RemoteStatus> {
            prop_oneof![Just(RemoteStatus::Queued), Just(RemoteStatus::Running)]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: a run of non-terminal statuses times out exactly at max_attempts.
            #[test]
            fn timeout_iff_budget_exhausted(
                max_attempts in 1u32..80,
                statuses in prop::collection::vec(non_terminal(), 1..100),
            ) {
                let mut p = poller(PollPolicy::new(Duration::from_secs(2), max_attempts));
                for (i, s) in statuses.iter().enumerate() {
                    let t = p.observe(Observation::Status(StatusReport::new(*s)));
                    let n = i as u32 + 1;
                    if n < max_attempts {
                        prop_assert_eq!(t.unwrap().to, PollState::Polling);
                    } else if n == max_attempts {
                        prop_assert_eq!(t.unwrap().to, PollState::TimedOut);
                    } else {
                        prop_assert!(t.is_err());
                    }
                }
            }

            /// Property: the first terminal status decides the outcome.
            #[test]
            fn first_terminal_status_wins(
                prefix in prop::collection::vec(non_terminal(), 0..59),
                finished in any::<bool>(),
            ) {
                let mut p = poller(PollPolicy::default());
                for s in &prefix {
                    p.observe(Observation::Status(StatusReport::new(*s))).unwrap();
                }
                let terminal = if finished { RemoteStatus::Finished } else { RemoteStatus::Failed };
                let t = p.observe(Observation::Status(StatusReport::new(terminal))).unwrap();
                prop_assert_eq!(t.to.clone(), if finished {
                    PollState::Succeeded
                } else {
                    PollState::Failed(PollFailure::Remote { message: "job failed without an error message".into() })
                });
                prop_assert_eq!(p.attempts(), prefix.len() as u32 + 1);
                prop_assert!(p.observe(Observation::Status(StatusReport::new(RemoteStatus::Queued))).is_err());
            }
        }
    }
}
