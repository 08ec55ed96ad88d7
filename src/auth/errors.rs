use thiserror::Error;

use crate::error::AppError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already used")]
    EmailAlreadyUsed,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Missing authorization header")]
    MissingAuthHeader,
    #[error("Invalid authorization header format")]
    InvalidAuthHeaderFormat,
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailAlreadyUsed => AppError::conflict(err.to_string()),
            AuthError::Jwt(e) => AppError::Internal(anyhow::Error::new(e).context("token encoding failed")),
            other => AppError::unauthorized(other.to_string()),
        }
    }
}
