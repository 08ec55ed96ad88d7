use axum::{
    extract::{Query, State},
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use validator::Validate;

use super::response::{ok, ApiResult};
use crate::auth::{jwt_auth_middleware, CoachSession, JwtService};
use crate::error::AppError;
use crate::models::{
    CreateWorkoutPlanRequest, ListResult, ListWorkoutPlansQuery, Pagination, UpdateWorkoutPlanRequest, WorkoutPlan,
    WorkoutPlanDetail,
};
use crate::services::WorkoutPlanService;

#[derive(Debug, Deserialize)]
pub struct PlanIdParams {
    pub id: i64,
}

pub fn workout_plan_routes(plan_service: WorkoutPlanService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/create", post(create_plan))
        .route("/update", post(update_plan))
        .route("/detail", get(get_plan))
        .route("/list", get(list_plans))
        .route("/delete", post(delete_plan))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(plan_service)
}

#[tracing::instrument(skip(service, request))]
async fn create_plan(
    State(service): State<WorkoutPlanService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateWorkoutPlanRequest>, AppError>,
) -> ApiResult<WorkoutPlanDetail> {
    request.validate()?;
    let plan = service.create(session.coach_id, request).await?;
    Ok(ok(plan))
}

#[tracing::instrument(skip(service, request))]
async fn update_plan(
    State(service): State<WorkoutPlanService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateWorkoutPlanRequest>, AppError>,
) -> ApiResult<WorkoutPlanDetail> {
    request.validate()?;
    let plan = service.update(session.coach_id, request).await?;
    Ok(ok(plan))
}

#[tracing::instrument(skip(service))]
async fn get_plan(
    State(service): State<WorkoutPlanService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(params), _): WithRejection<Query<PlanIdParams>, AppError>,
) -> ApiResult<WorkoutPlanDetail> {
    let plan = service.get(session.coach_id, params.id).await?;
    Ok(ok(plan))
}

#[tracing::instrument(skip(service))]
async fn list_plans(
    State(service): State<WorkoutPlanService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(filter), _): WithRejection<Query<ListWorkoutPlansQuery>, AppError>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<WorkoutPlan>> {
    let plans = service.list(session.coach_id, filter.owner_id, &page).await?;
    Ok(ok(plans))
}

#[tracing::instrument(skip(service))]
async fn delete_plan(
    State(service): State<WorkoutPlanService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(params), _): WithRejection<Json<PlanIdParams>, AppError>,
) -> ApiResult<()> {
    service.delete(session.coach_id, params.id).await?;
    Ok(ok(()))
}
