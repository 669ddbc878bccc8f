//! Several analyses in flight at once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::AnalysisError;
use crate::orchestrator::{AnalysisOrchestrator, CompletedAnalysis};
use crate::types::{AnalysisKind, AnalysisRequest};

/// Client-side handle for a tracked analysis, assigned before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackingId(Uuid);

impl TrackingId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type AnalysisOutcome = Result<CompletedAnalysis, AnalysisError>;

struct Tracked {
    kind: AnalysisKind,
    cancel: CancelToken,
    handle: JoinHandle<AnalysisOutcome>,
}

/// Runs each analysis on its own tokio task with its own cancel token.
///
/// Tasks share nothing but the orchestrator; a panic in one surfaces as
/// [`AnalysisError::Aborted`] for that analysis only. Dropping the tracker
/// cancels whatever is still running.
pub struct JobTracker {
    orchestrator: AnalysisOrchestrator,
    tracked: BTreeMap<TrackingId, Tracked>,
}

impl JobTracker {
    pub fn new(orchestrator: AnalysisOrchestrator) -> Self {
        Self {
            orchestrator,
            tracked: BTreeMap::new(),
        }
    }

    /// Start `request` in the background. Must be called within a tokio runtime.
    pub fn spawn(&mut self, request: AnalysisRequest) -> TrackingId {
        let id = TrackingId::new();
        let kind = request.kind();
        let cancel = CancelToken::new();
        let orchestrator = self.orchestrator.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { orchestrator.run(request, &token).await });

        tracing::debug!(tracking_id = %id, kind = %kind, "analysis spawned");
        self.tracked.insert(id, Tracked { kind, cancel, handle });
        id
    }

    /// Request cancellation of one analysis. Returns `false` for unknown ids.
    pub fn cancel(&self, id: TrackingId) -> bool {
        match self.tracked.get(&id) {
            Some(t) => {
                t.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for t in self.tracked.values() {
            t.cancel.cancel();
        }
    }

    pub fn kind(&self, id: TrackingId) -> Option<AnalysisKind> {
        self.tracked.get(&id).map(|t| t.kind)
    }

    /// `Some(true)` once the analysis has finished, successfully or not.
    pub fn is_finished(&self, id: TrackingId) -> Option<bool> {
        self.tracked.get(&id).map(|t| t.handle.is_finished())
    }

    /// Wait for one analysis and stop tracking it. `None` for unknown ids.
    pub async fn join(&mut self, id: TrackingId) -> Option<AnalysisOutcome> {
        let tracked = self.tracked.remove(&id)?;
        Some(flatten(id, tracked.handle.await))
    }

    /// Wait for every tracked analysis, in spawn order.
    pub async fn join_all(&mut self) -> Vec<(TrackingId, AnalysisOutcome)> {
        let tracked = std::mem::take(&mut self.tracked);
        let mut outcomes = Vec::with_capacity(tracked.len());
        for (id, t) in tracked {
            outcomes.push((id, flatten(id, t.handle.await)));
        }
        outcomes
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn flatten(id: TrackingId, joined: Result<AnalysisOutcome, JoinError>) -> AnalysisOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = if e.is_panic() { "task panicked" } else { "task was aborted" };
            tracing::error!(tracking_id = %id, error = %e, "{reason}");
            Err(AnalysisError::Aborted(reason.to_string()))
        }
    }
}
