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
    CreatePaperRequest, CreateQuizRequest, Exam, ExamDetail, ExamIdRequest, ListResult, Pagination, Paper,
    PaperDetail, PaperIdRequest, Quiz, QuizAnswer, SubmitAnswerRequest, UpdatePaperRequest,
};
use crate::services::ExamService;

pub fn exam_routes(exam_service: ExamService, jwt_service: JwtService) -> Router {
    Router::new()
        .route("/quiz/create", post(create_quiz))
        .route("/quiz/list", get(list_quizzes))
        .route("/paper/create", post(create_paper))
        .route("/paper/update", post(update_paper))
        .route("/paper/detail", get(get_paper))
        .route("/paper/list", get(list_papers))
        .route("/start", post(start_exam))
        .route("/submit_answer", post(submit_answer))
        .route("/finish", post(finish_exam))
        .route("/give_up", post(give_up_exam))
        .route("/detail", get(get_exam))
        .route("/list", get(list_exams))
        .route_layer(middleware::from_fn_with_state(jwt_service, jwt_auth_middleware))
        .with_state(exam_service)
}

#[tracing::instrument(skip(service, request))]
async fn create_quiz(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreateQuizRequest>, AppError>,
) -> ApiResult<Quiz> {
    request.validate()?;
    let quiz = service.create_quiz(session.coach_id, request).await?;
    Ok(ok(quiz))
}

#[tracing::instrument(skip(service))]
async fn list_quizzes(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<Quiz>> {
    let quizzes = service.list_quizzes(session.coach_id, &page).await?;
    Ok(ok(quizzes))
}

#[tracing::instrument(skip(service, request))]
async fn create_paper(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<CreatePaperRequest>, AppError>,
) -> ApiResult<PaperDetail> {
    request.validate()?;
    let paper = service.create_paper(session.coach_id, request).await?;
    Ok(ok(paper))
}

/// Update paper fields and reconcile its quiz links
#[tracing::instrument(skip(service, request))]
async fn update_paper(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<UpdatePaperRequest>, AppError>,
) -> ApiResult<PaperDetail> {
    request.validate()?;
    let paper = service.update_paper(session.coach_id, request).await?;
    Ok(ok(paper))
}

#[tracing::instrument(skip(service))]
async fn get_paper(
    State(service): State<ExamService>,
    WithRejection(Query(params), _): WithRejection<Query<PaperIdRequest>, AppError>,
) -> ApiResult<PaperDetail> {
    let paper = service.get_paper(params.paper_id).await?;
    Ok(ok(paper))
}

#[tracing::instrument(skip(service))]
async fn list_papers(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<Paper>> {
    let papers = service.list_papers(session.coach_id, &page).await?;
    Ok(ok(papers))
}

#[tracing::instrument(skip(service))]
async fn start_exam(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<PaperIdRequest>, AppError>,
) -> ApiResult<ExamDetail> {
    let exam = service.start_exam(session.coach_id, request.paper_id).await?;
    Ok(ok(exam))
}

#[tracing::instrument(skip(service, request))]
async fn submit_answer(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<SubmitAnswerRequest>, AppError>,
) -> ApiResult<QuizAnswer> {
    let answer = service.submit_answer(session.coach_id, request).await?;
    Ok(ok(answer))
}

#[tracing::instrument(skip(service))]
async fn finish_exam(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<ExamIdRequest>, AppError>,
) -> ApiResult<Exam> {
    let exam = service.finish_exam(session.coach_id, request.exam_id).await?;
    Ok(ok(exam))
}

#[tracing::instrument(skip(service))]
async fn give_up_exam(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Json(request), _): WithRejection<Json<ExamIdRequest>, AppError>,
) -> ApiResult<Exam> {
    let exam = service.give_up_exam(session.coach_id, request.exam_id).await?;
    Ok(ok(exam))
}

#[tracing::instrument(skip(service))]
async fn get_exam(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(params), _): WithRejection<Query<ExamIdRequest>, AppError>,
) -> ApiResult<ExamDetail> {
    let exam = service.get_exam(session.coach_id, params.exam_id).await?;
    Ok(ok(exam))
}

#[tracing::instrument(skip(service))]
async fn list_exams(
    State(service): State<ExamService>,
    Extension(session): Extension<CoachSession>,
    WithRejection(Query(page), _): WithRejection<Query<Pagination>, AppError>,
) -> ApiResult<ListResult<Exam>> {
    let exams = service.list_exams(session.coach_id, &page).await?;
    Ok(ok(exams))
}
