use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error surfaced through the `{code, msg, data}` envelope.
///
/// Every request-scoped failure funnels into one of these kinds. Database and
/// infrastructure failures are logged in full and rendered as a generic
/// internal error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("malformed persisted data: {0}")]
    MalformedPersistedData(String),
    #[error("an active subscription is required")]
    SubscriptionRequired,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Password hashing error: {0}")]
    PasswordHashing(#[from] bcrypt::BcryptError),
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPersistedData(msg.into())
    }

    /// Wire-visible integer code.
    pub fn code(&self) -> i32 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::SubscriptionRequired => 402,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::InvalidState(_) => 422,
            AppError::MalformedPersistedData(_) => 600,
            AppError::Database(_) | AppError::PasswordHashing(_) | AppError::Internal(_) => 500,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::PasswordHashing(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        match &self {
            AppError::Database(_) | AppError::PasswordHashing(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
            }
            AppError::MalformedPersistedData(detail) => {
                tracing::warn!(%detail, "stored document could not be parsed");
            }
            _ => tracing::debug!(code, error = %self, "request rejected"),
        }

        let body = Json(json!({
            "code": code,
            "msg": self.public_message(),
            "data": null,
        }));

        (StatusCode::OK, body).into_response()
    }
}
