use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing code")]
    MissingCode,

    #[error("Invalid or expired state")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    TokenExchange(Value),

    #[error("Failed to refresh Google token: {0}")]
    Refresh(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("Internal error: {0}")]
    Unhandled(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCode | ApiError::InvalidState => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::TokenExchange(_)
            | ApiError::Refresh(_)
            | ApiError::NotConfigured(_)
            | ApiError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        ApiError::Unhandled(value.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::Unhandled(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Unhandled(source) => {
                tracing::error!(error = ?source, "unhandled request error");
            }
            ApiError::TokenExchange(body) => {
                tracing::error!(provider_error = %body, "authorization code exchange rejected");
            }
            ApiError::Refresh(reason) => {
                tracing::error!(reason = %reason, "token refresh failed");
            }
            ApiError::NotConfigured(reason) => {
                tracing::error!(reason = %reason, "downstream not configured");
            }
            ApiError::MissingCode | ApiError::InvalidState | ApiError::Unauthenticated(_) => {
                tracing::warn!(status = %status, "request rejected: {}", self);
            }
        }

        if let ApiError::TokenExchange(body) = self {
            return (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                body.to_string(),
            )
                .into_response();
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
