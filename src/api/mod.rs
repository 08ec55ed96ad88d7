// API routes and handlers

pub mod auth;
pub mod coach;
pub mod exam;
pub mod gift_card;
pub mod health;
pub mod response;
pub mod routes;
pub mod subscription;
pub mod workout_day;
pub mod workout_plan;
pub mod workout_schedule;

pub use response::{ok, ApiResponse, ApiResult, SUCCESS_CODE};
pub use routes::create_routes;
