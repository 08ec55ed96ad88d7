use axum::{extract::State, middleware, response::Json, routing::post, Extension, Router};
use axum_extra::extract::WithRejection;
use validator::Validate;

use super::response::{ok, ApiResult};
use crate::auth::{jwt_auth_middleware, CoachSession, JwtService};
use crate::error::AppError;
use crate::models::{RedeemGiftCardRequest, RedeemResponse};
use crate::services::GiftCardService;

pub fn gift_card_routes(gift_card_service: GiftCardService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/redeem", post(redeem))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(gift_card_service)
}

/// Redeem a gift card into a subscription grant
#[tracing::instrument(skip(service, request))]
async fn redeem(
    State(service): State<GiftCardService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<RedeemGiftCardRequest>, AppError>,
) -> ApiResult<RedeemResponse> {
    request.validate()?;
    let redeemed = service.redeem(session.coach_id, &request.code).await?;
    Ok(ok(redeemed))
}
