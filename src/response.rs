use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::StoreError;
use crate::services::evaluation::EvaluationError;
use crate::services::mastery::MasteryError;
use crate::services::task_selector::SelectionError;

const RETRY_LATER: &str = "Service temporarily unavailable, please try again";
const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unavailable() -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", RETRY_LATER)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn operational(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.is_operational {
            self.message
        } else {
            tracing::error!(code = %self.code, message = %self.message, "internal error");
            INTERNAL_MESSAGE.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if let StoreError::MissingConcept(_) = err {
            return Self::internal(err.to_string());
        }
        tracing::warn!(error = %err, "store request failed");
        Self::unavailable()
    }
}

impl From<MasteryError> for AppError {
    fn from(err: MasteryError) -> Self {
        if err.is_invalid_input() {
            return Self::validation(err.to_string());
        }
        if let MasteryError::TaskNotFound(_) = err {
            return Self::not_found(err.to_string());
        }
        match err {
            MasteryError::Store(store) => Self::from(store),
            other => {
                tracing::warn!(error = %other, "mastery request failed");
                Self::unavailable()
            }
        }
    }
}

impl From<SelectionError> for AppError {
    fn from(err: SelectionError) -> Self {
        if err.is_invalid_input() {
            return Self::validation(err.to_string());
        }
        match err {
            SelectionError::Store(store) => Self::from(store),
            other => {
                tracing::warn!(error = %other, "task selection failed");
                Self::unavailable()
            }
        }
    }
}

impl From<EvaluationError> for AppError {
    fn from(err: EvaluationError) -> Self {
        if err.is_invalid_input() {
            return Self::validation(err.to_string());
        }
        tracing::error!(error = %err, "evaluation service call failed");
        Self::bad_gateway("Failed to communicate with evaluation service")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mastery_errors_map_to_status() {
        assert_eq!(
            AppError::from(MasteryError::EmptyTags).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(MasteryError::TaskNotFound("t".into())).status(),
            StatusCode::NOT_FOUND
        );
        let store = MasteryError::Store(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        let err = AppError::from(store);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_missing_concept_hides_details() {
        let err = AppError::from(StoreError::MissingConcept("c1".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_selection_errors_map_to_status() {
        assert_eq!(
            AppError::from(SelectionError::UnknownStrategy).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            AppError::from(SelectionError::Store(StoreError::Sqlx(sqlx::Error::PoolClosed)))
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_evaluation_errors_map_to_status() {
        assert_eq!(
            AppError::from(EvaluationError::Invalid("files must be an object")).status(),
            StatusCode::BAD_REQUEST
        );
        let upstream = EvaluationError::HttpStatus {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        assert_eq!(AppError::from(upstream).status(), StatusCode::BAD_GATEWAY);
    }
}
