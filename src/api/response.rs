use axum::Json;
use serde::Serialize;

use crate::error::AppError;

/// `code` carried by every successful envelope.
pub const SUCCESS_CODE: i32 = 200;

/// The `{code, msg, data}` envelope returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: &'static str,
    pub data: T,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: SUCCESS_CODE,
        msg: "ok",
        data,
    })
}
