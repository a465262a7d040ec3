use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProgressError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProgressError::Store(err) if err.is_transient())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProgressError::NotFound(_) => StatusCode::NOT_FOUND,
            ProgressError::Validation(_) => StatusCode::BAD_REQUEST,
            ProgressError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for ProgressError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ProgressError::Validation(errors.to_string())
    }
}

impl IntoResponse for ProgressError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ProgressError::Store(err) => {
                tracing::error!("Store failure surfaced to client: {}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "message": message,
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            ProgressError::NotFound("Exercise 9".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProgressError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let store = ProgressError::from(StoreError::Unavailable("down".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!store.is_transient());
        assert!(ProgressError::from(StoreError::Conflict("busy".into())).is_transient());
    }

    #[test]
    fn not_found_message_names_entity() {
        assert_eq!(
            ProgressError::NotFound("Exercise 9".into()).to_string(),
            "Exercise 9 not found"
        );
    }
}
