use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::json_rejection;
use crate::services::mastery::{AttemptOutcome, ConceptUpdate, ProgressEntry, TagFailure};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(read_mastery).post(update_mastery))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressQuery {
    #[serde(alias = "userId")]
    learner_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMasteryBody {
    #[serde(alias = "userId")]
    learner_id: Option<String>,
    tags: Option<Vec<String>>,
    result: Option<String>,
    task_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressResponse {
    learner_id: String,
    progress: Vec<ProgressEntry>,
}

#[derive(Serialize)]
struct UpdateResponse {
    ok: bool,
    updates: Vec<ConceptUpdate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<TagFailure>,
}

async fn read_mastery(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressResponse>, AppError> {
    let learner_id = query.learner_id.as_deref();
    let progress = state.mastery().progress(learner_id).await?;

    Ok(Json(ProgressResponse {
        learner_id: learner_id.unwrap_or_default().trim().to_string(),
        progress,
    }))
}

async fn update_mastery(
    State(state): State<AppState>,
    body: Result<Json<UpdateMasteryBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(json_rejection)?;
    let outcome = AttemptOutcome::parse(
        body.learner_id.as_deref(),
        body.tags.as_deref(),
        body.result.as_deref(),
        body.task_id.as_deref(),
    )?;

    let report = state.mastery().apply_outcome(&outcome).await?;
    let ok = report.is_complete();
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((
        status,
        Json(UpdateResponse {
            ok,
            updates: report.updates,
            failed: report.failed,
        }),
    )
        .into_response())
}
