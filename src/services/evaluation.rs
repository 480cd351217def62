use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::services::mastery::AttemptResult;

const DEFAULT_SERVICE_URL: &str = "http://localhost:3001";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const SERVICE_TOKEN_HEADER: &str = "X-LMS-Service-Token";

#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            token: String::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl EvaluationConfig {
    pub fn from_env() -> Self {
        let base_url = env_string("EVAL_SERVICE_URL")
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let token = env_string("EVAL_SERVICE_TOKEN").unwrap_or_default();
        let timeout =
            Duration::from_millis(env_u64("EVAL_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS));
        Self {
            base_url,
            token,
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalTest {
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalTask {
    pub tests: Vec<EvalTest>,
}

/// Submission forwarded to the evaluation service: the task's declared tests
/// plus the learner's files keyed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub task: EvalTask,
    pub files: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalVerdict {
    pub passed: bool,
    #[serde(default)]
    pub passed_ids: Vec<String>,
    #[serde(default)]
    pub failed_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub messages: Value,
}

impl EvalVerdict {
    pub fn result(&self) -> AttemptResult {
        if self.passed {
            AttemptResult::Pass
        } else {
            AttemptResult::Fail
        }
    }
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvaluationError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Checks the shape of a raw submission before anything is forwarded upstream.
pub fn parse_eval_request(body: Value) -> Result<EvalRequest, EvaluationError> {
    let Value::Object(mut body) = body else {
        return Err(EvaluationError::Invalid("request body must be a JSON object"));
    };

    let tests = match body.get_mut("task").and_then(|task| task.get_mut("tests")) {
        Some(Value::Array(tests)) => std::mem::take(tests),
        _ => {
            return Err(EvaluationError::Invalid(
                "Missing or invalid required field: task.tests (must be an array)",
            ))
        }
    };

    let files = match body.remove("files") {
        Some(Value::Object(files)) => files,
        _ => {
            return Err(EvaluationError::Invalid(
                "Missing or invalid required field: files (must be an object)",
            ))
        }
    };

    let tests = tests
        .into_iter()
        .map(parse_test)
        .collect::<Option<Vec<_>>>()
        .ok_or(EvaluationError::Invalid(
            "Each test must have an id and code property",
        ))?;

    Ok(EvalRequest {
        task: EvalTask { tests },
        files,
    })
}

fn parse_test(test: Value) -> Option<EvalTest> {
    let has_text = |key: &str| {
        test.get(key)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty())
    };
    if !has_text("id") || !has_text("code") {
        return None;
    }
    serde_json::from_value(test).ok()
}

/// HTTP client for the external code-evaluation service.
#[derive(Clone)]
pub struct EvaluationClient {
    config: EvaluationConfig,
    client: reqwest::Client,
}

impl EvaluationClient {
    pub fn new(config: EvaluationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Single attempt; retrying is left to the caller.
    pub async fn evaluate(&self, request: &EvalRequest) -> Result<EvalVerdict, EvaluationError> {
        let url = format!("{}/api/eval", self.config.base_url);
        let resp = self
            .client
            .post(&url)
            .header(SERVICE_TOKEN_HEADER, &self.config.token)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "evaluation service rejected submission");
            return Err(EvaluationError::HttpStatus { status, body });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(error = %e, "evaluation response was not a verdict");
            EvaluationError::Json(e)
        })
    }

    /// Never errors; an unreachable service reports `false`.
    pub async fn health(&self) -> bool {
        let url = format!("{}/api/health", self.config.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "evaluation service health probe failed");
                false
            }
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> EvaluationClient {
        EvaluationClient::new(EvaluationConfig {
            base_url: server.uri(),
            token: "service-token".into(),
            timeout: Duration::from_secs(5),
        })
    }

    fn submission() -> Value {
        json!({
            "task": { "tests": [{ "id": "t1", "code": "expect(h1).toExist()", "label": "Heading" }] },
            "files": { "index.html": "<h1>Hi</h1>" }
        })
    }

    #[test]
    fn test_parse_valid_request() {
        let request = parse_eval_request(submission()).unwrap();
        assert_eq!(request.task.tests.len(), 1);
        assert_eq!(request.task.tests[0].label.as_deref(), Some("Heading"));
        assert!(request.files.contains_key("index.html"));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        let cases = [
            json!({ "files": {} }),
            json!({ "task": { "tests": "nope" }, "files": {} }),
            json!({ "task": { "tests": [] }, "files": "index.html" }),
            json!({ "task": { "tests": [{ "id": "t1" }] }, "files": {} }),
            json!({ "task": { "tests": [{ "id": "", "code": "x" }] }, "files": {} }),
            json!([1, 2, 3]),
        ];
        for case in cases {
            let err = parse_eval_request(case).unwrap_err();
            assert!(err.is_invalid_input(), "unexpected error {err}");
        }
    }

    #[test]
    fn test_parse_accepts_empty_test_list() {
        let request = parse_eval_request(json!({ "task": { "tests": [] }, "files": {} })).unwrap();
        assert!(request.task.tests.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_forwards_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/eval"))
            .and(header(SERVICE_TOKEN_HEADER, "service-token"))
            .and(body_partial_json(json!({ "files": { "index.html": "<h1>Hi</h1>" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "passed": true,
                "passedIds": ["t1"],
                "failedIds": [],
                "messages": { "t1": "ok" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = parse_eval_request(submission()).unwrap();
        let verdict = client_for(&server).evaluate(&request).await.unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.passed_ids, vec!["t1"]);
        assert_eq!(verdict.result(), AttemptResult::Pass);
    }

    #[tokio::test]
    async fn test_evaluate_surfaces_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/eval"))
            .respond_with(ResponseTemplate::new(500).set_body_string("runner crashed"))
            .expect(1)
            .mount(&server)
            .await;

        let request = parse_eval_request(submission()).unwrap();
        let err = client_for(&server).evaluate(&request).await.unwrap_err();
        match err {
            EvaluationError::HttpStatus { status, body } => {
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "runner crashed");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_evaluate_failing_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/eval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "passed": false,
                "passedIds": [],
                "failedIds": ["t1"]
            })))
            .mount(&server)
            .await;

        let request = parse_eval_request(submission()).unwrap();
        let verdict = client_for(&server).evaluate(&request).await.unwrap();
        assert_eq!(verdict.result(), AttemptResult::Fail);
        assert_eq!(verdict.failed_ids, vec!["t1"]);
        assert!(verdict.messages.is_null());
    }

    #[tokio::test]
    async fn test_health_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(client_for(&server).health().await);

        let down = EvaluationClient::new(EvaluationConfig {
            base_url: "http://127.0.0.1:9".into(),
            token: String::new(),
            timeout: Duration::from_millis(500),
        });
        assert!(!down.health().await);
    }
}
