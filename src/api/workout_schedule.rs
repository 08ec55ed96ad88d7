use axum::{
    extract::{Query, State},
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::WithRejection;
use validator::Validate;

use super::response::{ok, ApiResult};
use crate::auth::{jwt_auth_middleware, CoachSession, JwtService};
use crate::error::AppError;
use crate::models::{
    CoachWorkoutSchedule, CreateScheduleRequest, ListResult, Pagination, ScheduleIdRequest, UpdateScheduleRequest,
    WorkoutSchedule, WorkoutScheduleDetail,
};
use crate::services::WorkoutScheduleService;

pub fn workout_schedule_routes(schedule_service: WorkoutScheduleService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/create", post(create_schedule))
        .route("/update", post(update_schedule))
        .route("/detail", get(get_schedule))
        .route("/list", get(list_schedules))
        .route("/apply", post(apply_schedule))
        .route("/cancel", post(cancel_schedule))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(schedule_service)
}

#[tracing::instrument(skip(service, request))]
async fn create_schedule(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateScheduleRequest>, AppError>,
) -> ApiResult<WorkoutScheduleDetail> {
    request.validate()?;
    let schedule = service.create(session.coach_id, request).await?;
    Ok(ok(schedule))
}

/// Rewrite a schedule and replace its slots
#[tracing::instrument(skip(service, request))]
async fn update_schedule(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateScheduleRequest>, AppError>,
) -> ApiResult<WorkoutScheduleDetail> {
    request.validate()?;
    let schedule = service.update(session.coach_id, request).await?;
    Ok(ok(schedule))
}

#[tracing::instrument(skip(service))]
async fn get_schedule(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(params), _): WithRejection<Query<ScheduleIdRequest>, AppError>,
) -> ApiResult<WorkoutScheduleDetail> {
    let schedule = service.get(session.coach_id, params.workout_schedule_id).await?;
    Ok(ok(schedule))
}

#[tracing::instrument(skip(service))]
async fn list_schedules(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<WorkoutSchedule>> {
    let schedules = service.list(session.coach_id, &page).await?;
    Ok(ok(schedules))
}

#[tracing::instrument(skip(service))]
async fn apply_schedule(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<ScheduleIdRequest>, AppError>,
) -> ApiResult<CoachWorkoutSchedule> {
    let applied = service.apply(session.coach_id, request.workout_schedule_id).await?;
    Ok(ok(applied))
}

#[tracing::instrument(skip(service))]
async fn cancel_schedule(
    State(service): State<WorkoutScheduleService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<ScheduleIdRequest>, AppError>,
) -> ApiResult<CoachWorkoutSchedule> {
    let cancelled = service.cancel(session.coach_id, request.workout_schedule_id).await?;
    Ok(ok(cancelled))
}
