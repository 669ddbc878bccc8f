//! Black-box tests of the HTTP client against an in-process mock of the
//! compute service bound to an ephemeral port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adaas_core::{DatasetId, JobId};
use adaas_jobs::{
    AnalysisError, AnalysisKind, AnalysisOrchestrator, AnalysisRequest, CancelToken, ClientConfig, ComputeService,
    GlmParams, HttpComputeClient, PollPolicy, RemoteStatus, ResultFetchError, ResultPayload, SubmissionError,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value as JsonValue, json};

const STATUS_SEQUENCE: [&str; 3] = ["queued", "started", "finished"];

#[derive(Default)]
struct MockState {
    next_job: Mutex<u32>,
    polls: Mutex<HashMap<String, usize>>,
    last_submission: Mutex<Option<JsonValue>>,
    result_fetches: Mutex<u32>,
}

async fn submit(State(state): State<Arc<MockState>>, Json(body): Json<JsonValue>) -> (StatusCode, Json<JsonValue>) {
    *state.last_submission.lock().unwrap() = Some(body.clone());

    let dataset = body["params"]["dataset_id"].as_str().unwrap_or_default();
    if dataset == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("Dataset {dataset} not found")})),
        );
    }

    let job_id = {
        let mut next = state.next_job.lock().unwrap();
        *next += 1;
        format!("job_{:08x}", *next)
    };
    state.polls.lock().unwrap().insert(job_id.clone(), 0);
    (StatusCode::OK, Json(json!({"job_id": job_id, "status": "queued"})))
}

async fn job_status(State(state): State<Arc<MockState>>, Path(job_id): Path<String>) -> (StatusCode, Json<JsonValue>) {
    let mut polls = state.polls.lock().unwrap();
    let Some(count) = polls.get_mut(&job_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Job not found"})));
    };
    let status = STATUS_SEQUENCE[(*count).min(STATUS_SEQUENCE.len() - 1)];
    *count += 1;
    (StatusCode::OK, Json(json!({"job_id": job_id, "status": status})))
}

async fn job_result(State(state): State<Arc<MockState>>, Path(job_id): Path<String>) -> (StatusCode, Json<JsonValue>) {
    *state.result_fetches.lock().unwrap() += 1;
    if !state.polls.lock().unwrap().contains_key(&job_id) {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Result not found or expired"})));
    }
    let body = json!({
        "model_type": "auto_arima",
        "forecast": {
            "periods": ["2024-04-01", "2024-05-01"],
            "values": [10.0, 11.0],
            "lower_bound": [8.0, 8.5],
            "upper_bound": [12.0, 13.5],
            "confidence_level": 0.9
        },
        "historical": {
            "periods": ["2024-01-01", "2024-02-01", "2024-03-01"],
            "actual": [7.0, 8.0, 9.5]
        },
        "metrics": {"rmse": 0.4, "mae": 0.3}
    });
    (StatusCode::OK, Json(body))
}

struct TestServer {
    base_url: String,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/v1/jobs", post(submit))
            .route("/api/v1/jobs/:job_id", get(job_status))
            .route("/api/v1/results/:job_id", get(job_result))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api/v1", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state, handle }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("{}/", self.base_url))
            .unwrap()
            .with_poll_policy(PollPolicy::new(Duration::from_millis(10), 20))
            .with_request_timeout(Duration::from_secs(5))
    }

    fn client(&self) -> HttpComputeClient {
        HttpComputeClient::new(self.config()).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn forecast(dataset: &str) -> AnalysisRequest {
    AnalysisRequest::from_parts(
        AnalysisKind::TimeSeries,
        dataset,
        json!({"forecastPeriods": 2, "confidenceLevel": 0.9}),
    )
    .unwrap()
}

#[tokio::test]
async fn forecast_runs_end_to_end_over_http() {
    let srv = TestServer::spawn().await;
    let orchestrator = AnalysisOrchestrator::from_config(srv.config()).unwrap();

    let done = orchestrator.run(forecast("claims"), &CancelToken::new()).await.unwrap();

    assert_eq!(done.job.id.as_str(), "job_00000001");
    assert_eq!(done.job.attempts, 3);
    let ResultPayload::TimeSeries(ts) = &done.payload else {
        panic!("expected a time-series payload");
    };
    assert_eq!(ts.forecast.values, vec![10.0, 11.0]);
    assert!(ts.historical.fitted.is_empty());
    assert_eq!(done.charts(orchestrator.chart_builder()).len(), 1);
    assert_eq!(*srv.state.result_fetches.lock().unwrap(), 1);
}

#[tokio::test]
async fn submission_body_is_kind_tagged() {
    let srv = TestServer::spawn().await;
    let request = AnalysisRequest::Glm(GlmParams::new(DatasetId::new("claims").unwrap(), "claim_count"));

    let job_id = srv.client().submit(&request).await.unwrap();
    assert_eq!(job_id.as_str(), "job_00000001");

    let body = srv.state.last_submission.lock().unwrap().clone().unwrap();
    assert_eq!(body["kind"], "glm");
    assert_eq!(body["params"]["dataset_id"], "claims");
    assert_eq!(body["params"]["target_col"], "claim_count");
    assert_eq!(body["params"]["family"], "auto");
}

#[tokio::test]
async fn rejected_submission_carries_detail() {
    let srv = TestServer::spawn().await;
    let orchestrator = AnalysisOrchestrator::from_config(srv.config()).unwrap();

    let err = orchestrator.run(forecast("missing"), &CancelToken::new()).await.unwrap_err();

    assert_eq!(
        err,
        AnalysisError::Submission(SubmissionError::Rejected {
            status: 404,
            detail: "Dataset missing not found".to_string(),
        })
    );
}

#[tokio::test]
async fn started_is_reported_as_running() {
    let srv = TestServer::spawn().await;
    let client = srv.client();
    let job_id = client.submit(&forecast("claims")).await.unwrap();

    let first = client.status(&job_id).await.unwrap();
    let second = client.status(&job_id).await.unwrap();
    assert_eq!(first.status, RemoteStatus::Queued);
    assert_eq!(second.status, RemoteStatus::Running);
}

#[tokio::test]
async fn unknown_job_status_is_a_poll_failure() {
    let srv = TestServer::spawn().await;
    let err = srv
        .client()
        .status(&JobId::new("job_deadbeef").unwrap())
        .await
        .unwrap_err();

    assert!(err.message.contains("404"));
    assert!(err.message.contains("Job not found"));
}

#[tokio::test]
async fn missing_result_is_expired() {
    let srv = TestServer::spawn().await;
    let job_id = JobId::new("job_deadbeef").unwrap();

    let err = srv.client().fetch_result(&job_id).await.unwrap_err();

    assert_eq!(err, ResultFetchError::Expired(job_id));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let config = ClientConfig::new("http://127.0.0.1:9/api/v1")
        .unwrap()
        .with_request_timeout(Duration::from_millis(500));
    let client = HttpComputeClient::new(config).unwrap();

    let err = client.submit(&forecast("claims")).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Network(_)));
}
