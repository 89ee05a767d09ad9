use axum::{
    extract::rejection::{BytesRejection, JsonRejection, QueryRejection},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::ErrorCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::calc::CalcError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadParams(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    RateLimited { message: String, retry_after_secs: u64 },

    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        ApiError::BadParams(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadParams(_) => "bad_params",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Database(_) | ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadParams(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                ApiError::NotFound("record not found".to_string())
            }
            rusqlite::Error::SqliteFailure(f, msg)
                if f.code == ErrorCode::ConstraintViolation =>
            {
                let detail = msg.unwrap_or_else(|| f.to_string());
                if detail.contains("UNIQUE") {
                    ApiError::Conflict(format!("duplicate value: {}", unique_columns(&detail)))
                } else if detail.contains("FOREIGN KEY") {
                    ApiError::Conflict(
                        "record is referenced by or references missing data".to_string(),
                    )
                } else {
                    ApiError::Conflict(detail)
                }
            }
            other => ApiError::Database(other),
        }
    }
}

/// "UNIQUE constraint failed: students.matricule" -> "students.matricule"
fn unique_columns(detail: &str) -> &str {
    detail
        .split_once(':')
        .map(|(_, cols)| cols.trim())
        .unwrap_or(detail)
}

impl From<CalcError> for ApiError {
    fn from(e: CalcError) -> Self {
        ApiError::BadParams(e.message)
    }
}

/// Oversized bodies keep their 413; every other extractor failure is a bad request.
fn body_rejection(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(text)
    } else {
        ApiError::BadParams(text)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        body_rejection(e.status(), e.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(e: BytesRejection) -> Self {
        body_rejection(e.status(), e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadParams(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(e) => {
                error!(error = %e, "database error");
                "internal database error".to_string()
            }
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut resp = (
            status,
            Json(json!({
                "success": false,
                "error": message,
                "code": self.code(),
            })),
        )
            .into_response();

        if let ApiError::RateLimited {
            retry_after_secs, ..
        } = self
        {
            resp.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        resp
    }
}
