use actix_web::{http::header, HttpResponse, ResponseError};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("conflict: already exists as {existing_id}")]
    Conflict { existing_id: Uuid },

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict(existing_id) => AppError::Conflict { existing_id },
            StoreError::Backend(msg) => AppError::Database(msg),
        }
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::Conflict { .. } => 409,
            AppError::RateLimited { .. } => 429,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::RateLimited { .. } => "rate_limited",
            _ => "internal",
        }
    }

    /// Persistence failures are opaque to callers.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Config(_) | AppError::StartServer(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Database(msg) = self {
            tracing::error!(error = %msg, "database error surfaced to client as 500");
        }

        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.public_message(),
        });
        let mut builder = HttpResponse::build(ResponseError::status_code(self));

        match self {
            AppError::RateLimited { retry_after_secs } => {
                body["retry_after"] = serde_json::json!(retry_after_secs);
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
            }
            AppError::Conflict { existing_id } => {
                body["existing_id"] = serde_json::json!(existing_id);
            }
            _ => {}
        }

        builder.json(body)
    }
}
