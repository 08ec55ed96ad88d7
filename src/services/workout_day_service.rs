use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::{
    aggregate_history, duration_minutes, raw_json, BackfillReport, CreateAndFinishRequest, CreateWorkoutDaysRequest,
    CreatedWorkoutDays, DayAction, FinishWorkoutDayRequest, HistoryEntry, ListResult, ListWorkoutDaysQuery,
    Pagination, PlanDetails, Progress, UpdateProgressRequest, UpdateWorkoutDayRequest, WorkoutActionHistory,
    WorkoutDay, WorkoutDayDetail, WorkoutDayPatch, WorkoutDayResult, WorkoutDayStatus, WorkoutPlan,
};
use crate::services::access::{can_view, ensure_can_view, ensure_coaches};
use crate::services::pagination::fetch_page;
use crate::services::subscription_service::SubscriptionService;
use crate::services::workout_plan_service::normalize_details;

const DAY_COLUMNS: &str = "id, title, type, remark, day, status, workout_plan_id, coach_id, student_id, group_no, \
     pending_steps, updated_details, started_at, finished_at, duration, total_volume, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, workout_day_id, student_id, workout_action_id, action_name, reps, reps_unit, \
     weight, weight_unit, step_uid, set_uid, act_uid, created_at";

pub const DEFAULT_DAY_TYPE: i16 = 1;
pub const BACKFILL_BATCH_SIZE: i64 = 200;

#[derive(Clone)]
pub struct WorkoutDayService {
    db: PgPool,
    subscriptions: SubscriptionService,
}

impl WorkoutDayService {
    pub fn new(db: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionService::new(db.clone()),
            db,
        }
    }

    /// Creates one day per student, sharing a `group_no`. Requires an
    /// active subscription.
    pub async fn create_for_group(&self, caller: i64, request: CreateWorkoutDaysRequest) -> AppResult<CreatedWorkoutDays> {
        let now = Utc::now();
        self.subscriptions.ensure_active(caller, now).await?;

        let mut seen = HashSet::new();
        let student_ids: Vec<i64> = request.student_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut tx = self.db.begin().await?;

        let plan = match request.workout_plan_id.filter(|id| *id > 0) {
            Some(plan_id) => {
                let plan = find_plan(&mut tx, plan_id).await?;
                ensure_can_view(&mut *tx, caller, plan.owner_id).await?;
                Some(plan)
            }
            None => None,
        };

        let title = match (request.title.trim(), &plan) {
            ("", Some(plan)) => plan.title.clone(),
            (title, _) => title.to_string(),
        };
        let day_type = request
            .day_type
            .or(plan.as_ref().map(|p| p.plan_type))
            .unwrap_or(DEFAULT_DAY_TYPE);
        let updated_details = match (request.details, &plan) {
            (Some(details), _) => normalize_details(Some(details))?,
            (None, Some(plan)) => PlanDetails::parse(&plan.details)?.to_json()?,
            (None, None) => String::new(),
        };

        let (status, started_at) = if request.start_when_create {
            (WorkoutDayStatus::Started, Some(now))
        } else {
            (WorkoutDayStatus::Pending, None)
        };
        let group_no = now.timestamp();
        let day = request.day.unwrap_or_else(|| now.date_naive());

        let mut ids = Vec::with_capacity(student_ids.len());
        for student_id in student_ids {
            ensure_coaches(&mut *tx, caller, student_id).await?;

            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO workout_day (title, type, remark, day, status, workout_plan_id, coach_id, student_id,
                                         group_no, updated_details, started_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                RETURNING id
                "#,
            )
            .bind(&title)
            .bind(day_type)
            .bind(&request.remark)
            .bind(day)
            .bind(status)
            .bind(plan.as_ref().map_or(0, |p| p.id))
            .bind(caller)
            .bind(student_id)
            .bind(group_no)
            .bind(&updated_details)
            .bind(started_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        tracing::info!(caller, group_no, count = ids.len(), started = request.start_when_create, "Created workout days");

        Ok(CreatedWorkoutDays { group_no, ids })
    }

    /// Records a free session that already happened, directly as finished.
    pub async fn create_and_finish(&self, caller: i64, request: CreateAndFinishRequest) -> AppResult<WorkoutDay> {
        let now = Utc::now();
        let started_at = DateTime::from_timestamp(request.started_at, 0)
            .filter(|at| *at <= now)
            .ok_or_else(|| AppError::bad_request("started_at must be a past unix timestamp"))?;
        let student_id = request.student_id.unwrap_or(caller);

        let mut tx = self.db.begin().await?;
        ensure_coaches(&mut *tx, caller, student_id).await?;

        let day: WorkoutDay = sqlx::query_as(&format!(
            r#"
            INSERT INTO workout_day (title, type, remark, day, status, coach_id, student_id,
                                     started_at, finished_at, duration, total_volume, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $9, $9)
            RETURNING {DAY_COLUMNS}
            "#
        ))
        .bind(request.title.trim())
        .bind(request.day_type.unwrap_or(DEFAULT_DAY_TYPE))
        .bind(&request.remark)
        .bind(started_at.date_naive())
        .bind(WorkoutDayStatus::Finished)
        .bind(caller)
        .bind(student_id)
        .bind(started_at)
        .bind(now)
        .bind(duration_minutes(started_at, now))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, workout_day_id = day.id, duration = day.duration, "Recorded finished workout day");
        Ok(day)
    }

    pub async fn start(&self, caller: i64, id: i64) -> AppResult<WorkoutDay> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, id).await?;
        let next = day.authorize(caller, DayAction::Start)?;

        let day: WorkoutDay = sqlx::query_as(&format!(
            "UPDATE workout_day SET status = $2, started_at = $3, updated_at = $3 WHERE id = $1 RETURNING {DAY_COLUMNS}"
        ))
        .bind(day.id)
        .bind(next)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, workout_day_id = id, "Workout day started");
        Ok(day)
    }

    /// Latest-wins autosave of the raw progress document.
    pub async fn update_progress(&self, caller: i64, request: UpdateProgressRequest) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, request.id).await?;
        day.authorize(caller, DayAction::UpdateProgress)?;

        sqlx::query("UPDATE workout_day SET pending_steps = $2, updated_at = NOW() WHERE id = $1")
            .bind(day.id)
            .bind(raw_json(&request.pending_steps))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(caller, workout_day_id = day.id, "Saved workout progress");
        Ok(())
    }

    /// Finishes a started day: writes one history row per completed action
    /// and stores the derived duration and volume.
    pub async fn finish(&self, caller: i64, request: FinishWorkoutDayRequest) -> AppResult<WorkoutDay> {
        let now = Utc::now();

        let incoming_steps = request.pending_steps.as_ref().map(raw_json);
        if let Some(raw) = &incoming_steps {
            Progress::parse(raw).map_err(|e| e.into_bad_request())?;
        }
        let incoming_details = match request.updated_details {
            Some(details) => Some(normalize_details(Some(details))?),
            None => None,
        };

        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, request.id).await?;
        let next = day.authorize(caller, DayAction::Finish)?;

        let pending_steps = incoming_steps.unwrap_or_else(|| day.pending_steps.clone());
        let progress = Progress::parse(&pending_steps)?;
        let entries = progress.history_entries(now);
        insert_history(&mut tx, day.id, day.student_id, &entries).await?;

        let started_at = day.started_at.unwrap_or(now);
        let duration = duration_minutes(started_at, now);
        let total_volume = progress.total_volume();

        let finished: WorkoutDay = sqlx::query_as(&format!(
            r#"
            UPDATE workout_day SET
                status = $2,
                pending_steps = $3,
                updated_details = COALESCE($4, updated_details),
                started_at = $5,
                finished_at = $6,
                duration = $7,
                total_volume = $8,
                updated_at = $6
            WHERE id = $1
            RETURNING {DAY_COLUMNS}
            "#
        ))
        .bind(day.id)
        .bind(next)
        .bind(&pending_steps)
        .bind(incoming_details)
        .bind(started_at)
        .bind(now)
        .bind(duration)
        .bind(total_volume)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            caller,
            workout_day_id = day.id,
            histories = entries.len(),
            duration,
            total_volume,
            "Workout day finished"
        );
        Ok(finished)
    }

    /// Re-opens a finished or abandoned day and retires its history.
    pub async fn continue_day(&self, caller: i64, id: i64) -> AppResult<WorkoutDay> {
        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, id).await?;
        let next = day.authorize(caller, DayAction::Continue)?;

        let retired = sqlx::query(
            "UPDATE workout_action_history SET d = 1 WHERE workout_day_id = $1 AND COALESCE(d, 0) = 0",
        )
        .bind(day.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let day: WorkoutDay = sqlx::query_as(&format!(
            r#"
            UPDATE workout_day SET status = $2, finished_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING {DAY_COLUMNS}
            "#
        ))
        .bind(day.id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, workout_day_id = id, retired, "Workout day continued");
        Ok(day)
    }

    pub async fn give_up(&self, caller: i64, id: i64) -> AppResult<WorkoutDay> {
        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, id).await?;
        let next = day.authorize(caller, DayAction::GiveUp)?;

        let day: WorkoutDay = sqlx::query_as(&format!(
            "UPDATE workout_day SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {DAY_COLUMNS}"
        ))
        .bind(day.id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(caller, workout_day_id = id, "Workout day given up");
        Ok(day)
    }

    pub async fn update(&self, caller: i64, request: UpdateWorkoutDayRequest) -> AppResult<WorkoutDay> {
        let patch = WorkoutDayPatch {
            title: request.title.map(|t| t.trim().to_string()),
            remark: request.remark,
            day: request.day,
            updated_details: match request.updated_details {
                Some(details) => Some(normalize_details(Some(details))?),
                None => None,
            },
        };

        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, request.id).await?;
        day.authorize(caller, DayAction::Edit)?;
        if patch.is_empty() {
            return Ok(day);
        }

        let day: WorkoutDay = sqlx::query_as(&format!(
            r#"
            UPDATE workout_day SET
                title = COALESCE($2, title),
                remark = COALESCE($3, remark),
                day = COALESCE($4, day),
                updated_details = COALESCE($5, updated_details),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DAY_COLUMNS}
            "#
        ))
        .bind(day.id)
        .bind(patch.title)
        .bind(patch.remark)
        .bind(patch.day)
        .bind(patch.updated_details)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(day)
    }

    pub async fn delete(&self, caller: i64, id: i64) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let day = lock_day(&mut tx, id).await?;
        day.authorize(caller, DayAction::Delete)?;

        sqlx::query("UPDATE workout_day SET d = 1, updated_at = NOW() WHERE id = $1")
            .bind(day.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE workout_action_history SET d = 1 WHERE workout_day_id = $1 AND COALESCE(d, 0) = 0")
            .bind(day.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(caller, workout_day_id = id, "Deleted workout day");
        Ok(())
    }

    pub async fn get(&self, viewer: i64, id: i64) -> AppResult<WorkoutDayDetail> {
        let day = self.find_visible(viewer, id).await?;
        let progress = Progress::parse(&day.pending_steps)?;
        let updated_details = PlanDetails::parse(&day.updated_details)?;
        Ok(WorkoutDayDetail {
            workout_day: day,
            progress,
            updated_details,
        })
    }

    pub async fn list(
        &self,
        viewer: i64,
        filter: &ListWorkoutDaysQuery,
        page: &Pagination,
    ) -> AppResult<ListResult<WorkoutDay>> {
        let window = page.window()?;
        let student_id = filter.student_id.unwrap_or(viewer);
        ensure_can_view(&self.db, viewer, student_id).await?;

        let mut query = QueryBuilder::new(format!("SELECT {DAY_COLUMNS} FROM workout_day WHERE COALESCE(d, 0) = 0"));
        query.push(" AND student_id = ").push_bind(student_id);
        if let Some(status) = filter.status {
            let status = WorkoutDayStatus::try_from(status).map_err(AppError::bad_request)?;
            query.push(" AND status = ").push_bind(status);
        }
        fetch_page(&self.db, query, "id", &window).await
    }

    /// Per-step and per-action totals computed from the live history.
    pub async fn result(&self, viewer: i64, id: i64) -> AppResult<WorkoutDayResult> {
        let day = self.find_visible(viewer, id).await?;
        let histories: Vec<WorkoutActionHistory> = sqlx::query_as(&format!(
            "SELECT {HISTORY_COLUMNS} FROM workout_action_history \
             WHERE workout_day_id = $1 AND COALESCE(d, 0) = 0 ORDER BY id ASC"
        ))
        .bind(day.id)
        .fetch_all(&self.db)
        .await?;

        let (steps, total_volume) = aggregate_history(&histories);
        Ok(WorkoutDayResult {
            workout_day: day,
            total_volume,
            steps,
        })
    }

    /// Recomputes title, type, duration and volume of finished days.
    /// Rows whose progress cannot be parsed are skipped.
    pub async fn backfill(&self) -> AppResult<BackfillReport> {
        let mut report = BackfillReport::default();
        let mut cursor = 0_i64;

        loop {
            let batch: Vec<WorkoutDay> = sqlx::query_as(&format!(
                "SELECT {DAY_COLUMNS} FROM workout_day \
                 WHERE COALESCE(d, 0) = 0 AND status = $1 AND id > $2 ORDER BY id ASC LIMIT $3"
            ))
            .bind(WorkoutDayStatus::Finished)
            .bind(cursor)
            .bind(BACKFILL_BATCH_SIZE)
            .fetch_all(&self.db)
            .await?;

            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.id;

            for day in batch {
                report.scanned += 1;
                match self.backfill_one(&day).await {
                    Ok(true) => report.updated += 1,
                    Ok(false) => {}
                    Err(AppError::MalformedPersistedData(detail)) => {
                        tracing::warn!(workout_day_id = day.id, %detail, "Skipped workout day during backfill");
                        report.skipped += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        tracing::info!(scanned = report.scanned, updated = report.updated, skipped = report.skipped, "Backfill complete");
        Ok(report)
    }

    async fn backfill_one(&self, day: &WorkoutDay) -> AppResult<bool> {
        let progress = Progress::parse(&day.pending_steps)?;
        let total_volume = progress.total_volume();
        let duration = match (day.started_at, day.finished_at) {
            (Some(started), Some(finished)) => duration_minutes(started, finished),
            _ => day.duration,
        };

        let plan = if day.workout_plan_id > 0 && day.title.trim().is_empty() {
            let mut conn = self.db.acquire().await?;
            find_plan(&mut conn, day.workout_plan_id).await.ok()
        } else {
            None
        };
        let title = plan.as_ref().map_or_else(|| day.title.clone(), |p| p.title.clone());
        let day_type = plan.as_ref().map_or(day.day_type, |p| p.plan_type);

        if title == day.title && day_type == day.day_type && duration == day.duration && total_volume == day.total_volume {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE workout_day SET title = $2, type = $3, duration = $4, total_volume = $5, updated_at = NOW() WHERE id = $1",
        )
        .bind(day.id)
        .bind(&title)
        .bind(day_type)
        .bind(duration)
        .bind(total_volume)
        .execute(&self.db)
        .await?;
        Ok(true)
    }

    /// Participants always see their day; others need a relationship with
    /// the student.
    async fn find_visible(&self, viewer: i64, id: i64) -> AppResult<WorkoutDay> {
        let day: WorkoutDay = sqlx::query_as(&format!(
            "SELECT {DAY_COLUMNS} FROM workout_day WHERE id = $1 AND COALESCE(d, 0) = 0"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("workout day"))?;

        if day.role_of(viewer).is_none() && !can_view(&self.db, viewer, day.student_id).await? {
            tracing::warn!(viewer, workout_day_id = id, "relationship gate denied access");
            return Err(AppError::unauthorized("no relationship with this student"));
        }
        Ok(day)
    }
}

async fn lock_day(conn: &mut PgConnection, id: i64) -> AppResult<WorkoutDay> {
    sqlx::query_as(&format!(
        "SELECT {DAY_COLUMNS} FROM workout_day WHERE id = $1 AND COALESCE(d, 0) = 0 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("workout day"))
}

async fn find_plan(conn: &mut PgConnection, plan_id: i64) -> AppResult<WorkoutPlan> {
    sqlx::query_as(
        "SELECT id, title, overview, type, tags, details, owner_id, created_at, updated_at \
         FROM workout_plan WHERE id = $1 AND COALESCE(d, 0) = 0",
    )
    .bind(plan_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("workout plan"))
}

async fn insert_history(
    conn: &mut PgConnection,
    workout_day_id: i64,
    student_id: i64,
    entries: &[HistoryEntry],
) -> AppResult<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut query = QueryBuilder::new(
        "INSERT INTO workout_action_history (workout_day_id, student_id, workout_action_id, action_name, reps, \
         reps_unit, weight, weight_unit, step_uid, set_uid, act_uid, d, created_at) ",
    );
    query.push_values(entries, |mut row, entry| {
        row.push_bind(workout_day_id)
            .push_bind(student_id)
            .push_bind(entry.workout_action_id)
            .push_bind(entry.action_name.clone())
            .push_bind(entry.reps)
            .push_bind(entry.reps_unit.clone())
            .push_bind(entry.weight)
            .push_bind(entry.weight_unit.clone())
            .push_bind(entry.step_uid.clone())
            .push_bind(entry.set_uid.clone())
            .push_bind(entry.act_uid.clone())
            .push_bind(0_i16)
            .push_bind(entry.completed_at);
    });
    query.build().execute(&mut *conn).await?;
    Ok(())
}
