use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::error::StoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(StoreError::Other(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Store(StoreError::NotFound(address)) => format!("wallet not found: {address}"),
            Self::Store(err @ StoreError::Unavailable(_)) => {
                tracing::warn!(error = %err, "store unavailable");
                "store unavailable".to_string()
            }
            Self::Store(err @ StoreError::Other(_)) => {
                tracing::error!(error = %err, "store error");
                "internal server error".to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
