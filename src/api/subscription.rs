use axum::{
    extract::{Query, State},
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::WithRejection;

use super::response::{ok, ApiResult};
use crate::auth::{jwt_auth_middleware, CoachSession, JwtService};
use crate::error::AppError;
use crate::models::{CalcOrderRequest, ListResult, OrderAmount, Pagination, Subscription};
use crate::services::SubscriptionService;

pub fn subscription_routes(subscription_service: SubscriptionService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/list", get(list_subscriptions))
        .route("/calc", post(calc_order_amount))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(subscription_service)
}

#[tracing::instrument(skip(service))]
async fn list_subscriptions(
    State(service): State<SubscriptionService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<Subscription>> {
    let subscriptions = service.list(session.coach_id, &page).await?;
    Ok(ok(subscriptions))
}

#[tracing::instrument(skip(service))]
async fn calc_order_amount(
    State(service): State<SubscriptionService>,
    WithRejection(Json(request), _): WithRejection<Json<CalcOrderRequest>, AppError>,
) -> ApiResult<OrderAmount> {
    let amount = service.calc_order_amount(request.plan_id, request.period).await?;
    Ok(ok(amount))
}
