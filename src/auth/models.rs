use serde::{Deserialize, Serialize};
use validator::Validate;

/// Token payload: `{id, expires_at, issuer}`. `expires_at` is in Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub expires_at: i64,
    pub issuer: String,
}

/// The authenticated coach, inserted into request extensions by
/// [`jwt_auth_middleware`](crate::auth::jwt_auth_middleware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoachSession {
    pub coach_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 255), contains(pattern = "@", message = "invalid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub coach_id: i64,
    pub expires_at: i64,
}
