//! HTTP Error Responses
//!
//! Two JSON shapes are in use, depending on the endpoint:
//! `{"error": {"code", "message"}}` and `{"error": "...", "details": "..."}`.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lesson_accounts::{AccountError, ErrorKind};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// `{"error": {"code", "message"}}`
    Coded {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// `{"error": "...", "details"?: "..."}`
    Plain {
        status: StatusCode,
        error: String,
        details: Option<String>,
    },
}

impl ApiError {
    pub fn coded(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Coded {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn plain(status: StatusCode, error: impl Into<String>) -> Self {
        Self::Plain {
            status,
            error: error.into(),
            details: None,
        }
    }

    /// Payments endpoints hit with no processor configured
    pub fn payments_disabled() -> Self {
        Self::coded(
            StatusCode::SERVICE_UNAVAILABLE,
            "payments_disabled",
            "Payments not configured",
        )
    }

    /// Coded shape, status picked by error kind
    pub fn from_account(err: &AccountError) -> Self {
        log(err);
        Self::coded(status_for(err.kind()), err.code(), err.user_message())
    }

    /// Coded shape with a fixed status, as the lesson endpoints answer
    pub fn from_account_with(status: StatusCode, err: &AccountError) -> Self {
        log(err);
        Self::coded(status, err.code(), err.user_message())
    }

    /// Plain shape: a summary plus the underlying message as details
    pub fn detailed(status: StatusCode, error: impl Into<String>, err: &AccountError) -> Self {
        log(err);
        Self::Plain {
            status,
            error: error.into(),
            details: Some(err.user_message()),
        }
    }
}

/// `Json` body extractor that rejects with the coded error shape
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Malformed request body");
        Self::coded(rejection.status(), "invalid_request", rejection.body_text())
    }
}

/// Default status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log(err: &AccountError) {
    match err.kind() {
        ErrorKind::Upstream | ErrorKind::Internal => tracing::error!(
            error = %err,
            failed_step = ?err.failed_step(),
            completed = ?err.completed_steps(),
            "Request failed"
        ),
        _ => tracing::debug!(error = %err, "Request rejected"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Coded {
                status,
                code,
                message,
            } => (status, Json(json!({ "error": { "code": code, "message": message } })))
                .into_response(),
            Self::Plain {
                status,
                error,
                details: Some(details),
            } => (status, Json(json!({ "error": error, "details": details }))).into_response(),
            Self::Plain {
                status,
                error,
                details: None,
            } => (status, Json(json!({ "error": error }))).into_response(),
        }
    }
}
