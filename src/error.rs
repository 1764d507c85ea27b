//! Internal code keeps returning `anyhow::Result` with `.context(...)`
//! breadcrumbs throughout the store and Solr client modules. At the
//! HTTP boundary, errors are translated into this typed taxonomy so
//! callers get a stable status code plus a separate user-facing
//! message and detail string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    Authorization(String),
    Business { message: String, status: StatusCode },
    Database(anyhow::Error),
    ExternalService { message: String, timed_out: bool },
    SearchEngine { message: String, engine_unavailable: bool },
    NotFound(String),
    Validation(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authorization(_) => StatusCode::UNAUTHORIZED,
            AppError::Business { status, .. } => *status,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService { timed_out, .. } => {
                if *timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }
            AppError::SearchEngine {
                engine_unavailable, ..
            } => {
                if *engine_unavailable {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            AppError::NotFound(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// User-facing message: never leaks internal detail for database
    /// errors.
    fn message(&self) -> String {
        match self {
            AppError::Authorization(m) => m.clone(),
            AppError::Business { message, .. } => message.clone(),
            AppError::Database(_) => "a database error occurred".to_string(),
            AppError::ExternalService { message, .. } => message.clone(),
            AppError::SearchEngine { message, .. } => message.clone(),
            AppError::NotFound(m) => m.clone(),
            AppError::Validation(m) => m.clone(),
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::Database(err) => format!("{err:?}"),
            other => other.message(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(status = %status, detail = %self.detail(), "request failed");
        let body = ErrorBody {
            message: self.message(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.into())
    }
}
