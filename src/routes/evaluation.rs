use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::response::AppError;
use crate::routes::json_rejection;
use crate::services::evaluation::{parse_eval_request, EvalVerdict};
use crate::state::AppState;

const SERVICE_NAME: &str = "Code Evaluation Service";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health).post(evaluate))
}

#[derive(Serialize)]
struct EvalHealthResponse {
    status: &'static str,
    service: &'static str,
    available: bool,
}

async fn evaluate(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EvalVerdict>, AppError> {
    let Json(body) = body.map_err(json_rejection)?;
    let request = parse_eval_request(body)?;
    let verdict = state.evaluation().evaluate(&request).await?;
    tracing::info!(
        passed = verdict.passed,
        passed_tests = verdict.passed_ids.len(),
        failed_tests = verdict.failed_ids.len(),
        "submission evaluated"
    );
    Ok(Json(verdict))
}

async fn health(State(state): State<AppState>) -> Response {
    let available = state.evaluation().health().await;
    let (status_code, status) = if available {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (
        status_code,
        Json(EvalHealthResponse {
            status,
            service: SERVICE_NAME,
            available,
        }),
    )
        .into_response()
}
