use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::shared::core::errors::ApplicationError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

pub fn status_of(error: &ApplicationError) -> StatusCode {
    match error {
        ApplicationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApplicationError::Permission(_) => StatusCode::FORBIDDEN,
        ApplicationError::Conflict { .. } | ApplicationError::Cancelled { .. } => {
            StatusCode::CONFLICT
        }
        ApplicationError::NotFound(_) => StatusCode::NOT_FOUND,
        ApplicationError::External(_) => StatusCode::BAD_GATEWAY,
        ApplicationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let (current_status, processed, total) = match &self {
            ApplicationError::Conflict { current_status, .. } => (current_status.clone(), None, None),
            ApplicationError::Cancelled { processed, total } => (None, Some(*processed), Some(*total)),
            _ => (None, None, None),
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            current_status,
            processed,
            total,
        };
        (status, Json(body)).into_response()
    }
}

/// Unwraps a JSON body, turning malformed input into a validation error.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApplicationError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApplicationError::Validation(rejection.body_text()))
}
