use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::store::{TaskDetail, TaskFilter, TaskSummary};
use crate::response::AppError;
use crate::routes::json_rejection;
use crate::services::rating::{MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/next", post(next_task))
        .route("/:id", get(get_task))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    difficulty: Option<String>,
    concept: Option<String>,
    concept_id: Option<String>,
}

impl ListQuery {
    /// Unparseable or out-of-range difficulties are dropped rather than rejected.
    fn into_filter(self) -> TaskFilter {
        let difficulty = self
            .difficulty
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .filter(|d| (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(d));
        TaskFilter {
            difficulty,
            concept: non_blank(self.concept),
            concept_id: non_blank(self.concept_id),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextTaskBody {
    #[serde(alias = "userId")]
    learner_id: Option<String>,
    strategy: Option<String>,
}

#[derive(Serialize)]
struct TaskListResponse {
    tasks: Vec<TaskSummary>,
}

#[derive(Serialize)]
struct TaskResponse {
    task: Option<TaskDetail>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TaskListResponse>, AppError> {
    let filter = query.into_filter();
    let tasks = state.catalog().list_tasks(&filter).await?;
    tracing::debug!(count = tasks.len(), ?filter, "tasks listed");
    Ok(Json(TaskListResponse { tasks }))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, AppError> {
    match state.catalog().get_task(&id).await? {
        Some(task) => Ok(Json(TaskResponse { task: Some(task) })),
        None => Err(AppError::not_found("Task not found")),
    }
}

/// Responds `{ "task": null }` when the learner has nothing left to attempt.
async fn next_task(
    State(state): State<AppState>,
    body: Result<Json<NextTaskBody>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let Json(body) = body.map_err(json_rejection)?;
    let task = state
        .selector()
        .next_task(body.learner_id.as_deref(), body.strategy.as_deref())
        .await?;
    Ok(Json(TaskResponse { task }))
}
