use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

use super::pagination::Identified;
use super::workout_details::PlanDetails;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkoutPlan {
    pub id: i64,
    pub title: String,
    pub overview: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub plan_type: i16,
    pub tags: String,
    #[serde(skip_serializing)]
    pub details: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for WorkoutPlan {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutPlanDetail {
    #[serde(flatten)]
    pub plan: WorkoutPlan,
    pub details: PlanDetails,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkoutPlanRequest {
    #[validate(length(min = 1, max = 128, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default = "default_plan_type", rename = "type")]
    pub plan_type: i16,
    #[serde(default)]
    pub tags: String,
    pub details: Option<Value>,
}

fn default_plan_type() -> i16 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkoutPlanRequest {
    pub id: i64,
    #[validate(length(min = 1, max = 128))]
    pub title: Option<String>,
    pub overview: Option<String>,
    #[serde(rename = "type")]
    pub plan_type: Option<i16>,
    pub tags: Option<String>,
    pub details: Option<Value>,
}

/// Column values for a plan update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct WorkoutPlanPatch {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub plan_type: Option<i16>,
    pub tags: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListWorkoutPlansQuery {
    pub owner_id: Option<i64>,
}
