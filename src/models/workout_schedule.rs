use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::pagination::Identified;
use crate::error::{AppError, AppResult};

int_enum! {
    pub enum ScheduleType {
        Weekly = 1,
        Cycle = 2,
    }
}

int_enum! {
    pub enum ScheduleApplyStatus {
        Applied = 1,
        Cancelled = 2,
    }
}

pub const MAX_CYCLE_DAYS: i32 = 365;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkoutSchedule {
    pub id: i64,
    pub title: String,
    pub overview: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub schedule_type: ScheduleType,
    pub day_count: i32,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for WorkoutSchedule {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScheduleSlot {
    pub id: i64,
    pub workout_plan_id: i64,
    pub plan_title: String,
    pub weekday: Option<i16>,
    pub day: Option<i32>,
    pub idx: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutScheduleDetail {
    #[serde(flatten)]
    pub schedule: WorkoutSchedule,
    pub slots: Vec<ScheduleSlot>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CoachWorkoutSchedule {
    pub id: i64,
    pub coach_id: i64,
    pub workout_schedule_id: i64,
    pub status: ScheduleApplyStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInput {
    pub workout_plan_id: i64,
    pub weekday: Option<i16>,
    pub day: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateScheduleRequest {
    #[validate(length(min = 1, max = 128, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub day_count: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 400))]
    pub plans: Vec<SlotInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateScheduleRequest {
    pub id: i64,
    #[validate(length(min = 1, max = 128, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub day_count: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 400))]
    pub plans: Vec<SlotInput>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleIdRequest {
    pub workout_schedule_id: i64,
}

/// A slot ready for insertion, positioned by `idx` within the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRow {
    pub workout_plan_id: i64,
    pub weekday: Option<i16>,
    pub day: Option<i32>,
    pub idx: i32,
}

/// Resolves the effective day count and checks every slot's key against it.
pub fn validate_slots(
    schedule_type: ScheduleType,
    day_count: Option<i32>,
    slots: &[SlotInput],
) -> AppResult<(i32, Vec<SlotRow>)> {
    let day_count = match schedule_type {
        ScheduleType::Weekly => 7,
        ScheduleType::Cycle => match day_count {
            Some(n) if (1..=MAX_CYCLE_DAYS).contains(&n) => n,
            _ => {
                return Err(AppError::bad_request(format!(
                    "cycle schedules need day_count between 1 and {MAX_CYCLE_DAYS}"
                )))
            }
        },
    };

    let rows = slots
        .iter()
        .enumerate()
        .map(|(idx, slot)| {
            let (weekday, day) = match schedule_type {
                ScheduleType::Weekly => match slot.weekday {
                    Some(w) if (0..=6).contains(&w) => (Some(w), None),
                    _ => return Err(AppError::bad_request("weekly slots need weekday 0-6")),
                },
                ScheduleType::Cycle => match slot.day {
                    Some(d) if (1..=day_count).contains(&d) => (None, Some(d)),
                    _ => {
                        return Err(AppError::bad_request(format!(
                            "cycle slots need day between 1 and {day_count}"
                        )))
                    }
                },
            };
            Ok(SlotRow {
                workout_plan_id: slot.workout_plan_id,
                weekday,
                day,
                idx: idx as i32,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok((day_count, rows))
}
