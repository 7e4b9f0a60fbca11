use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{operation} not allowed from state {current}")]
    InvalidState { current: String, operation: String },

    #[error("Tutor {0} has reached the maximum active interview load")]
    TutorOverloaded(Uuid),

    #[error("Tutor and application belong to different companies")]
    CrossCompany,

    #[error("Application already has an active interview request")]
    ApplicationLocked,

    #[error("Duplicate application: {0}")]
    DuplicateApplication(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Transient failure after retries: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code surfaced to clients alongside the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::InvalidSchedule(_) => "INVALID_SCHEDULE",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::TutorOverloaded(_) => "TUTOR_OVERLOADED",
            Error::CrossCompany => "CROSS_COMPANY",
            Error::ApplicationLocked => "APPLICATION_LOCKED",
            Error::DuplicateApplication(_) => "DUPLICATE_APPLICATION",
            Error::Validation(_) => "VALIDATION",
            Error::Json(_) => "BAD_JSON",
            Error::Transient(_) => "TRANSIENT",
            _ => "INTERNAL",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.error_code();
        let (status, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::InvalidSchedule(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unauthorized(msg) => (StatusCode::FORBIDDEN, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::InvalidState { current, operation } => (
                StatusCode::CONFLICT,
                format!("{} not allowed from state {}", operation, current),
            ),
            Error::TutorOverloaded(id) => (
                StatusCode::CONFLICT,
                format!("Tutor {} is at maximum interview load", id),
            ),
            Error::CrossCompany => (
                StatusCode::BAD_REQUEST,
                "Tutor and application belong to different companies".to_string(),
            ),
            Error::ApplicationLocked => (
                StatusCode::CONFLICT,
                "Application already has an active interview request".to_string(),
            ),
            Error::DuplicateApplication(msg) => (StatusCode::CONFLICT, msg),
            Error::Validation(err) => {
                let details = serde_json::to_value(err.field_errors()).unwrap_or_default();
                let body = Json(json!({
                    "error": "Validation failed",
                    "error_code": "VALIDATION",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Transient(msg) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(%correlation_id, error = %msg, "transient failure exhausted retries");
                let body = Json(json!({
                    "error": "Service temporarily unavailable",
                    "error_code": "TRANSIENT",
                    "correlation_id": correlation_id,
                }));
                return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
            }
            Error::Database(err) => return internal_response(code, err.to_string()),
            Error::Reqwest(err) => return internal_response(code, err.to_string()),
            Error::Internal(msg) => return internal_response(code, msg),
            Error::Io(err) => return internal_response(code, err.to_string()),
            Error::Anyhow(err) => return internal_response(code, err.to_string()),
            Error::Config(msg) => return internal_response(code, msg),
        };

        let body = Json(json!({ "error": error_message, "error_code": code }));
        (status, body).into_response()
    }
}

fn internal_response(code: &str, detail: String) -> axum::response::Response {
    let correlation_id = Uuid::new_v4();
    tracing::error!(%correlation_id, error = %detail, "internal error");
    let body = Json(json!({
        "error": "An unexpected error occurred",
        "error_code": code,
        "correlation_id": correlation_id,
    }));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
