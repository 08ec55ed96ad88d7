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
    CreateAndFinishRequest, CreateWorkoutDaysRequest, CreatedWorkoutDays, FinishWorkoutDayRequest, ListResult,
    ListWorkoutDaysQuery, Pagination, UpdateProgressRequest, UpdateWorkoutDayRequest, WorkoutDay, WorkoutDayDetail,
    WorkoutDayIdRequest, WorkoutDayResult,
};
use crate::services::WorkoutDayService;

pub fn workout_day_routes(day_service: WorkoutDayService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/create", post(create_workout_days))
        .route("/create_and_finish", post(create_and_finish))
        .route("/start", post(start_workout_day))
        .route("/update_progress", post(update_progress))
        .route("/finish", post(finish_workout_day))
        .route("/continue", post(continue_workout_day))
        .route("/give_up", post(give_up_workout_day))
        .route("/update", post(update_workout_day))
        .route("/delete", post(delete_workout_day))
        .route("/detail", get(get_workout_day))
        .route("/list", get(list_workout_days))
        .route("/result", get(workout_day_result))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(day_service)
}

/// Create one workout day per student under a shared group number
#[tracing::instrument(skip(service, request))]
async fn create_workout_days(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateWorkoutDaysRequest>, AppError>,
) -> ApiResult<CreatedWorkoutDays> {
    request.validate()?;
    let created = service.create_for_group(session.coach_id, request).await?;
    Ok(ok(created))
}

#[tracing::instrument(skip(service, request))]
async fn create_and_finish(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateAndFinishRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    request.validate()?;
    let day = service.create_and_finish(session.coach_id, request).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service))]
async fn start_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    let day = service.start(session.coach_id, request.id).await?;
    Ok(ok(day))
}

/// Autosave of in-flight progress
#[tracing::instrument(skip(service, request))]
async fn update_progress(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateProgressRequest>, AppError>,
) -> ApiResult<()> {
    service.update_progress(session.coach_id, request).await?;
    Ok(ok(()))
}

#[tracing::instrument(skip(service, request))]
async fn finish_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<FinishWorkoutDayRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    let day = service.finish(session.coach_id, request).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service))]
async fn continue_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    let day = service.continue_day(session.coach_id, request.id).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service))]
async fn give_up_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    let day = service.give_up(session.coach_id, request.id).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service, request))]
async fn update_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateWorkoutDayRequest>, AppError>,
) -> ApiResult<WorkoutDay> {
    request.validate()?;
    let day = service.update(session.coach_id, request).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service))]
async fn delete_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<()> {
    service.delete(session.coach_id, request.id).await?;
    Ok(ok(()))
}

#[tracing::instrument(skip(service))]
async fn get_workout_day(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(params), _): WithRejection<Query<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<WorkoutDayDetail> {
    let day = service.get(session.coach_id, params.id).await?;
    Ok(ok(day))
}

#[tracing::instrument(skip(service))]
async fn list_workout_days(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(filter), _): WithRejection<Query<ListWorkoutDaysQuery>, AppError>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<WorkoutDay>> {
    let days = service.list(session.coach_id, &filter, &page).await?;
    Ok(ok(days))
}

/// Per-step and per-action totals of a finished day
#[tracing::instrument(skip(service))]
async fn workout_day_result(
    State(service): State<WorkoutDayService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(params), _): WithRejection<Query<WorkoutDayIdRequest>, AppError>,
) -> ApiResult<WorkoutDayResult> {
    let result = service.result(session.coach_id, params.id).await?;
    Ok(ok(result))
}
