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
    CoachRelationship, CreateStudentRequest, CreatedStudent, ListResult, Pagination, ProfileResponse,
    StudentListItem, UpdateProfileRequest, UpdateRelationshipRequest,
};
use crate::services::CoachService;

pub fn coach_routes(coach_service: CoachService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/students", get(list_students).post(create_student))
        .route("/relationship/status", post(update_relationship_status))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(coach_service)
}

/// Profile with the current subscription; promotes a due subscription.
#[tracing::instrument(skip(service))]
async fn get_profile(
    State(service): State<CoachService>,
    Extension(session): Extension<CoachSession>,
) -> ApiResult<ProfileResponse> {
    let profile = service.get_profile(session.coach_id).await?;
    Ok(ok(profile))
}

#[tracing::instrument(skip(service, request))]
async fn update_profile(
    State(service): State<CoachService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateProfileRequest>, AppError>,
) -> ApiResult<ProfileResponse> {
    request.validate()?;
    let profile = service.update_profile(session.coach_id, request).await?;
    Ok(ok(profile))
}

#[tracing::instrument(skip(service, request))]
async fn create_student(
    State(service): State<CoachService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateStudentRequest>, AppError>,
) -> ApiResult<CreatedStudent> {
    request.validate()?;
    let created = service.create_student(session.coach_id, request).await?;
    Ok(ok(created))
}

#[tracing::instrument(skip(service))]
async fn list_students(
    State(service): State<CoachService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<StudentListItem>> {
    let students = service.list_students(session.coach_id, &page).await?;
    Ok(ok(students))
}

#[tracing::instrument(skip(service))]
async fn update_relationship_status(
    State(service): State<CoachService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateRelationshipRequest>, AppError>,
) -> ApiResult<CoachRelationship> {
    let relationship = service.update_relationship_status(session.coach_id, request).await?;
    Ok(ok(relationship))
}
