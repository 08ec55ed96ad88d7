use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, X_CONTENT_TYPE_OPTIONS},
        HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::auth::{extract_bearer_token, AuthError, JwtService};
use crate::error::AppError;

/// Resolves the bearer token into a [`CoachSession`](crate::auth::CoachSession)
/// request extension. Any failure answers 401 before the handler runs.
pub async fn jwt_auth_middleware(
    State(jwt_service): State<JwtService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let session = extract_bearer_token(header)
        .and_then(|token| jwt_service.extract_session(token, Utc::now()))
        .map_err(|err| {
            tracing::debug!(error = %err, path = %request.uri().path(), "rejected credentials");
            err
        })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

pub fn security_headers_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
}
