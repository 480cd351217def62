mod evaluation;
mod health;
mod mastery;
mod tasks;

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/mastery", mastery::router())
        .nest("/api/tasks", tasks::router())
        .nest("/api/eval", evaluation::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    AppError::not_found("Endpoint not found").into_response()
}

/// Malformed JSON bodies are caller errors, reported in the shared error envelope.
fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::validation(rejection.body_text())
}
