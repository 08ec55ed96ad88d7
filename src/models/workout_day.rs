use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

use super::pagination::Identified;
use super::workout_details::{action_volume, normalize_weight, round1, PlanDetails, Progress, UNIT_COUNT};
use crate::error::{AppError, AppResult};

int_enum! {
    pub enum WorkoutDayStatus {
        Pending = 0,
        Started = 1,
        Finished = 2,
        Expired = 3,
        Cancelled = 4,
        GaveUp = 5,
    }
}

/// Operations that touch a workout day, checked by [`WorkoutDayStatus::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayAction {
    Start,
    Finish,
    Continue,
    GiveUp,
    UpdateProgress,
    Edit,
    Delete,
}

/// How the caller relates to a workout day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRole {
    Coach,
    Student,
}

impl DayAction {
    pub fn allowed_for(self, role: DayRole) -> bool {
        match self {
            DayAction::Start | DayAction::Finish | DayAction::GiveUp | DayAction::UpdateProgress => true,
            DayAction::Continue | DayAction::Edit | DayAction::Delete => role == DayRole::Coach,
        }
    }
}

impl WorkoutDayStatus {
    /// The single transition table for workout days. Returns the status the
    /// day ends up in, or `InvalidState` when the action is illegal here.
    pub fn apply(self, action: DayAction) -> AppResult<WorkoutDayStatus> {
        use WorkoutDayStatus::*;

        let next = match (self, action) {
            (Pending, DayAction::Start) => Some(Started),
            (Started, DayAction::Finish) => Some(Finished),
            (Started, DayAction::GiveUp) => Some(GaveUp),
            (Finished | GaveUp, DayAction::Continue) => Some(Started),
            (Started, DayAction::UpdateProgress) => Some(Started),
            (Pending | Started, DayAction::Edit) => Some(self),
            (_, DayAction::Delete) => Some(self),
            _ => None,
        };

        next.ok_or_else(|| {
            AppError::invalid_state(format!(
                "cannot {} a workout day in status {:?}",
                action.verb(),
                self
            ))
        })
    }
}

impl DayAction {
    fn verb(self) -> &'static str {
        match self {
            DayAction::Start => "start",
            DayAction::Finish => "finish",
            DayAction::Continue => "continue",
            DayAction::GiveUp => "give up",
            DayAction::UpdateProgress => "save progress of",
            DayAction::Edit => "edit",
            DayAction::Delete => "delete",
        }
    }
}

/// Whole minutes between two instants after truncating both to the minute.
pub fn duration_minutes(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> i32 {
    let minutes = finished_at.timestamp().div_euclid(60) - started_at.timestamp().div_euclid(60);
    minutes.max(0) as i32
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkoutDay {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub day_type: i16,
    pub remark: String,
    pub day: NaiveDate,
    pub status: WorkoutDayStatus,
    pub workout_plan_id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub group_no: Option<i64>,
    #[serde(skip_serializing)]
    pub pending_steps: String,
    #[serde(skip_serializing)]
    pub updated_details: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: i32,
    pub total_volume: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identified for WorkoutDay {
    fn id(&self) -> i64 {
        self.id
    }
}

impl WorkoutDay {
    /// Legacy rows have `coach_id = 0`; their student authored them.
    pub fn author_id(&self) -> i64 {
        if self.coach_id == 0 {
            self.student_id
        } else {
            self.coach_id
        }
    }

    pub fn role_of(&self, caller: i64) -> Option<DayRole> {
        if caller == self.author_id() {
            Some(DayRole::Coach)
        } else if caller == self.student_id {
            Some(DayRole::Student)
        } else {
            None
        }
    }

    /// Checks the caller's role and the current status for `action`,
    /// returning the status to write.
    pub fn authorize(&self, caller: i64, action: DayAction) -> AppResult<WorkoutDayStatus> {
        let role = self
            .role_of(caller)
            .ok_or_else(|| AppError::unauthorized("not a participant of this workout day"))?;
        if !action.allowed_for(role) {
            return Err(AppError::invalid_state(format!(
                "only the coach may {} a workout day",
                action.verb()
            )));
        }
        self.status.apply(action)
    }
}

/// A workout day with its stored documents parsed and normalized.
#[derive(Debug, Clone, Serialize)]
pub struct WorkoutDayDetail {
    #[serde(flatten)]
    pub workout_day: WorkoutDay,
    pub progress: Progress,
    pub updated_details: PlanDetails,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkoutActionHistory {
    pub id: i64,
    pub workout_day_id: i64,
    pub student_id: i64,
    pub workout_action_id: i64,
    pub action_name: String,
    pub reps: i32,
    pub reps_unit: String,
    pub weight: f64,
    pub weight_unit: String,
    pub step_uid: String,
    pub set_uid: String,
    pub act_uid: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub workout_action_id: i64,
    pub action_name: String,
    pub set_count: i64,
    pub total_reps: i64,
    pub max_weight: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step_uid: String,
    pub volume: f64,
    pub actions: Vec<ActionResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutDayResult {
    pub workout_day: WorkoutDay,
    pub total_volume: f64,
    pub steps: Vec<StepResult>,
}

/// Groups live history rows by step, then by action, keeping first-seen
/// order. Weights are compared in kilograms.
pub fn aggregate_history(rows: &[WorkoutActionHistory]) -> (Vec<StepResult>, f64) {
    let mut steps: Vec<StepResult> = Vec::new();
    let mut raw_total = 0.0;

    for row in rows {
        let volume = action_volume(row.reps as f64, &row.reps_unit, row.weight, &row.weight_unit);
        raw_total += volume;

        let step_pos = match steps.iter().position(|s| s.step_uid == row.step_uid) {
            Some(pos) => pos,
            None => {
                steps.push(StepResult {
                    step_uid: row.step_uid.clone(),
                    volume: 0.0,
                    actions: Vec::new(),
                });
                steps.len() - 1
            }
        };
        let step = &mut steps[step_pos];
        step.volume += volume;

        let action_pos = match step
            .actions
            .iter()
            .position(|a| a.workout_action_id == row.workout_action_id && a.action_name == row.action_name)
        {
            Some(pos) => pos,
            None => {
                step.actions.push(ActionResult {
                    workout_action_id: row.workout_action_id,
                    action_name: row.action_name.clone(),
                    set_count: 0,
                    total_reps: 0,
                    max_weight: 0.0,
                    volume: 0.0,
                });
                step.actions.len() - 1
            }
        };
        let action = &mut step.actions[action_pos];
        action.set_count += 1;
        if row.reps_unit == UNIT_COUNT {
            action.total_reps += row.reps as i64;
        }
        action.max_weight = action.max_weight.max(normalize_weight(row.weight, &row.weight_unit));
        action.volume += volume;
    }

    for step in &mut steps {
        step.volume = round1(step.volume);
        for action in &mut step.actions {
            action.volume = round1(action.volume);
        }
    }

    (steps, round1(raw_total))
}

/// Partial update of a workout day's editable fields.
#[derive(Debug, Clone, Default)]
pub struct WorkoutDayPatch {
    pub title: Option<String>,
    pub remark: Option<String>,
    pub day: Option<NaiveDate>,
    pub updated_details: Option<String>,
}

impl WorkoutDayPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.remark.is_none() && self.day.is_none() && self.updated_details.is_none()
    }
}

/// Accepts a document either as an encoded JSON string or inline JSON.
pub fn raw_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkoutDaysRequest {
    #[validate(length(min = 1, max = 50, message = "between 1 and 50 students"))]
    pub student_ids: Vec<i64>,
    #[serde(default)]
    pub start_when_create: bool,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub title: String,
    #[serde(default, rename = "type")]
    pub day_type: Option<i16>,
    pub details: Option<Value>,
    pub workout_plan_id: Option<i64>,
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAndFinishRequest {
    pub student_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 128))]
    pub title: String,
    #[serde(default, rename = "type")]
    pub day_type: Option<i16>,
    /// Unix seconds.
    #[validate(range(min = 1))]
    pub started_at: i64,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkoutDayIdRequest {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgressRequest {
    pub id: i64,
    pub pending_steps: Value,
}

#[derive(Debug, Deserialize)]
pub struct FinishWorkoutDayRequest {
    pub id: i64,
    pub pending_steps: Option<Value>,
    pub updated_details: Option<Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkoutDayRequest {
    pub id: i64,
    #[validate(length(max = 128))]
    pub title: Option<String>,
    pub remark: Option<String>,
    pub day: Option<NaiveDate>,
    pub updated_details: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListWorkoutDaysQuery {
    pub student_id: Option<i64>,
    pub status: Option<i16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedWorkoutDays {
    pub group_no: i64,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub scanned: u64,
    pub updated: u64,
    pub skipped: u64,
}
