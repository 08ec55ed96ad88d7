// Integration tests for complete request/response cycles against a real database
// Each test skips itself when TEST_DATABASE_URL is not set

pub mod auth_flow_test;
pub mod exam_flow_test;
pub mod gift_card_test;
pub mod subscription_test;
pub mod workout_day_flow_test;
pub mod workout_plan_test;
