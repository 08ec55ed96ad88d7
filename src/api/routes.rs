use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::auth::auth_routes;
use super::coach::coach_routes;
use super::exam::exam_routes;
use super::gift_card::gift_card_routes;
use super::health::health_check;
use super::subscription::subscription_routes;
use super::workout_day::workout_day_routes;
use super::workout_plan::workout_plan_routes;
use super::workout_schedule::workout_schedule_routes;
use crate::auth::{cors_layer, security_headers_layer, AuthService, JwtService};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::{
    CoachService, ContentFilter, ExamService, GiftCardService, LexiconFilter, SubscriptionService,
    WorkoutDayService, WorkoutPlanService, WorkoutScheduleService,
};

pub fn create_routes(db: PgPool, config: Arc<AppConfig>) -> Result<Router> {
    let jwt_service = JwtService::new(&config.jwt_secret, config.token_ttl_hours);
    let content_filter: Arc<dyn ContentFilter> = Arc::new(LexiconFilter::new(&config.sensitive_words)?);

    let auth_service = AuthService::new(db.clone(), jwt_service.clone(), config.clone());
    let coach_service = CoachService::new(db.clone(), config, content_filter);

    let api = Router::new()
        .nest("/auth", auth_routes(auth_service))
        .nest("/coach", coach_routes(coach_service, jwt_service.clone()))
        .nest(
            "/subscription",
            subscription_routes(SubscriptionService::new(db.clone()), jwt_service.clone()),
        )
        .nest("/gift_card", gift_card_routes(GiftCardService::new(db.clone()), jwt_service.clone()))
        .nest(
            "/workout_plan",
            workout_plan_routes(WorkoutPlanService::new(db.clone()), jwt_service.clone()),
        )
        .nest(
            "/workout_schedule",
            workout_schedule_routes(WorkoutScheduleService::new(db.clone()), jwt_service.clone()),
        )
        .nest("/workout_day", workout_day_routes(WorkoutDayService::new(db.clone()), jwt_service.clone()))
        .nest("/exam", exam_routes(ExamService::new(db), jwt_service));

    Ok(Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors_layer())
        .layer(security_headers_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response)))
}

/// Renders a handler panic as the internal-error envelope. The request's
/// transaction is dropped, and so rolled back, while unwinding.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(%detail, "handler panicked");
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
