// HTTP route handlers for the PyJudge API

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use pyjudge_common::types::{parse_name_list, Submission, TestCase};
use pyjudge_engine::literal::{self, LiteralError};
use pyjudge_engine::{ExtractionError, SubmitError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Either `"math, collections"` or `["math", "collections"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    Csv(String),
    List(Vec<String>),
}

impl NameList {
    fn into_set(self) -> HashSet<String> {
        match self {
            NameList::Csv(list) => parse_name_list(&list),
            NameList::List(names) => names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Default for NameList {
    fn default() -> Self {
        NameList::List(Vec::new())
    }
}

/// Test cases as one literal-syntax string or as JSON.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TestCasesInput {
    Literal(String),
    Json(serde_json::Value),
}

impl TestCasesInput {
    fn parse(self) -> Result<Vec<TestCase>, LiteralError> {
        match self {
            TestCasesInput::Literal(text) => literal::parse_test_cases(&text),
            TestCasesInput::Json(value) => literal::normalize_test_cases(value),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunCodeRequest {
    pub source: String,
    #[serde(default)]
    pub allowed_imports: NameList,
    pub test_cases: TestCasesInput,
    #[serde(default)]
    pub allowed_operations: Option<NameList>,
}

#[derive(Debug, Serialize)]
pub struct RunCodeResponse {
    pub message: &'static str,
    pub job_id: String,
}

fn detail(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "detail": message.into(),
            "error": kind,
        })),
    )
        .into_response()
}

fn submit_error_status(err: &SubmitError) -> StatusCode {
    match err {
        SubmitError::AdmissionDenied { .. } => StatusCode::BAD_REQUEST,
        SubmitError::Store(_) | SubmitError::Extraction(ExtractionError::Spawn(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        SubmitError::Validation(_) | SubmitError::Extraction(_) | SubmitError::DuplicateTestCase(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

/// The peer IP, unless the deployment sits behind a proxy trusted to set
/// `x-client-id`.
fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>, trust_header: bool) -> Option<String> {
    let from_header = || {
        headers
            .get(CLIENT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    trust_header
        .then(from_header)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// POST /run-code - Validate a submission and start its tests
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<RunCodeRequest>,
) -> Response {
    let client_id = client_id(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_client_id_header,
    );

    let test_cases = match payload.test_cases.parse() {
        Ok(cases) => cases,
        Err(e) => {
            warn!(client_id = client_id.as_deref().unwrap_or("-"), error = %e, "Rejected test cases");
            metrics::record_submission("InvalidTestCase");
            return detail(
                StatusCode::UNPROCESSABLE_ENTITY,
                "InvalidTestCase",
                format!("INVALID TEST CASE FORMAT: {}", e),
            );
        }
    };

    let mut submission = Submission::new(payload.source, payload.allowed_imports.into_set());
    if let Some(operations) = payload.allowed_operations {
        submission = submission.with_allowed_operations(operations.into_set());
    }

    match state
        .coordinator
        .submit(submission, test_cases, client_id.clone())
        .await
    {
        Ok(accepted) => {
            metrics::record_submission("accepted");
            info!(job_id = %accepted.job_id, client_id = client_id.as_deref().unwrap_or("-"), "Submission accepted");
            (
                StatusCode::OK,
                Json(RunCodeResponse {
                    message: "Code execution started.",
                    job_id: accepted.job_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_submission(e.kind());
            let status = submit_error_status(&e);
            if status.is_server_error() {
                error!(error = %e, "Submission failed");
            } else {
                info!(kind = e.kind(), error = %e, "Submission rejected");
            }
            detail(status, e.kind(), e.to_string())
        }
    }
}

/// GET /get-result/{job_id} - Destructive read of a finished job
pub async fn get_result(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.coordinator.take_result(&job_id).await {
        Ok(Some(result)) => {
            metrics::record_retrieval(true);
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => {
            metrics::record_retrieval(false);
            detail(StatusCode::NOT_FOUND, "NotFound", "Execution not found.")
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch job result");
            detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "StoreError",
                format!("Failed to query job result: {}", e),
            )
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn export_metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_id_is_peer_unless_header_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("alice"));
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();

        assert_eq!(client_id(&headers, Some(peer), false).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_id(&headers, Some(peer), true).as_deref(), Some("alice"));
        assert_eq!(client_id(&HeaderMap::new(), Some(peer), true).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_id(&headers, None, false), None);
    }

    #[test]
    fn test_name_list_forms() {
        let csv: NameList = serde_json::from_str(r#""math, collections""#).unwrap();
        assert_eq!(csv.into_set().len(), 2);

        let list: NameList = serde_json::from_str(r#"["math", " "]"#).unwrap();
        let set = list.into_set();
        assert_eq!(set.len(), 1);
        assert!(set.contains("math"));
    }

    #[test]
    fn test_error_status_mapping() {
        let denied = SubmitError::AdmissionDenied { running_job_id: "x".into() };
        assert_eq!(submit_error_status(&denied), StatusCode::BAD_REQUEST);

        let duplicate = SubmitError::DuplicateTestCase(1);
        assert_eq!(submit_error_status(&duplicate), StatusCode::UNPROCESSABLE_ENTITY);

        let missing: SubmitError = ExtractionError::EntryPointNotFound { name: "solve".into() }.into();
        assert_eq!(submit_error_status(&missing), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
