//! Error types for authdemo
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Every variant maps to an HTTP status and a stable upper-snake-case
/// code, which clients read from the `code` field of the error body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Social provider is not registered (404)
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// OAuth state missing, unknown or expired (400)
    #[error("Invalid OAuth state")]
    InvalidState,

    /// Provider email belongs to an existing user and is unverified (409)
    #[error("Account not linked")]
    AccountNotLinked,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Identity provider rejected or failed the request (502)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing/encoding error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidState => "INVALID_STATE",
            AppError::AccountNotLinked => "ACCOUNT_NOT_LINKED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::HttpClient(_) => "HTTP_CLIENT_ERROR",
            AppError::Provider(_) => "PROVIDER_ERROR",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Encryption(_) => "ENCRYPTION_ERROR",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::InvalidState => StatusCode::BAD_REQUEST,
            AppError::AccountNotLinked => StatusCode::CONFLICT,
            AppError::HttpClient(_) | AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client
    ///
    /// Database and internal failures are not echoed back verbatim.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Validation(msg)
            | AppError::Provider(msg)
            | AppError::Config(msg)
            | AppError::Encryption(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Body shape: `{"code": "...", "message": "..."}`.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.code()])
            .inc();

        let body = Json(serde_json::json!({
            "code": self.code(),
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}
