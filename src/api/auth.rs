use axum::{extract::State, response::Json, routing::post, Router};
use axum_extra::extract::WithRejection;
use validator::Validate;

use super::response::{ok, ApiResult};
use crate::auth::{AuthResponse, AuthService, LoginRequest, RegisterRequest};
use crate::error::AppError;

/// Authentication routes
pub fn auth_routes(auth_service: AuthService) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(auth_service)
}

/// Register a new coach account
#[tracing::instrument(skip(auth_service, request))]
async fn register(
    State(auth_service): State<AuthService>,
    WithRejection(Json(request), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> ApiResult<AuthResponse> {
    request.validate()?;
    let response = auth_service.register(request).await?;
    Ok(ok(response))
}

/// Login with email and password
#[tracing::instrument(skip(auth_service, request))]
async fn login(
    State(auth_service): State<AuthService>,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, AppError>,
) -> ApiResult<AuthResponse> {
    request.validate()?;
    let response = auth_service.login(request).await?;
    Ok(ok(response))
}
