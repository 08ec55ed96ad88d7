use chrono::Utc;
use sqlx::{PgConnection, PgPool, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::{
    validate_slots, CoachWorkoutSchedule, CreateScheduleRequest, ListResult, Pagination, ScheduleApplyStatus,
    ScheduleSlot, SlotRow, UpdateScheduleRequest, WorkoutSchedule, WorkoutScheduleDetail,
};
use crate::services::access::ensure_can_view;
use crate::services::pagination::fetch_page;

const SCHEDULE_COLUMNS: &str = "id, title, overview, type, day_count, owner_id, created_at, updated_at";

#[derive(Clone)]
pub struct WorkoutScheduleService {
    db: PgPool,
}

impl WorkoutScheduleService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner_id: i64, request: CreateScheduleRequest) -> AppResult<WorkoutScheduleDetail> {
        let (day_count, slots) = validate_slots(request.schedule_type, request.day_count, &request.plans)?;

        let mut tx = self.db.begin().await?;
        ensure_plans_exist(&mut tx, &slots).await?;

        let schedule: WorkoutSchedule = sqlx::query_as(&format!(
            r#"
            INSERT INTO workout_schedule (title, overview, type, day_count, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(request.title.trim())
        .bind(&request.overview)
        .bind(request.schedule_type)
        .bind(day_count)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_slots(&mut tx, schedule.id, &slots).await?;
        let slots = fetch_slots(&mut tx, schedule.id).await?;
        tx.commit().await?;

        tracing::info!(owner_id, schedule_id = schedule.id, slots = slots.len(), "Created workout schedule");
        Ok(WorkoutScheduleDetail { schedule, slots })
    }

    /// Rewrites the schedule and replaces its whole slot set.
    pub async fn update(&self, owner_id: i64, request: UpdateScheduleRequest) -> AppResult<WorkoutScheduleDetail> {
        let (day_count, slots) = validate_slots(request.schedule_type, request.day_count, &request.plans)?;

        let mut tx = self.db.begin().await?;

        let existing: WorkoutSchedule = sqlx::query_as(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM workout_schedule WHERE id = $1 AND COALESCE(d, 0) = 0 FOR UPDATE"
        ))
        .bind(request.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("workout schedule"))?;
        if existing.owner_id != owner_id {
            return Err(AppError::unauthorized("only the owner may edit this schedule"));
        }

        ensure_plans_exist(&mut tx, &slots).await?;

        let schedule: WorkoutSchedule = sqlx::query_as(&format!(
            r#"
            UPDATE workout_schedule SET title = $2, overview = $3, type = $4, day_count = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(request.title.trim())
        .bind(&request.overview)
        .bind(request.schedule_type)
        .bind(day_count)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM workout_plan_in_schedule WHERE workout_schedule_id = $1")
            .bind(schedule.id)
            .execute(&mut *tx)
            .await?;
        insert_slots(&mut tx, schedule.id, &slots).await?;
        let slots = fetch_slots(&mut tx, schedule.id).await?;

        tx.commit().await?;
        tracing::info!(owner_id, schedule_id = schedule.id, slots = slots.len(), "Updated workout schedule");
        Ok(WorkoutScheduleDetail { schedule, slots })
    }

    pub async fn get(&self, viewer: i64, schedule_id: i64) -> AppResult<WorkoutScheduleDetail> {
        let schedule = self.find(schedule_id).await?;
        ensure_can_view(&self.db, viewer, schedule.owner_id).await?;

        let mut conn = self.db.acquire().await?;
        let slots = fetch_slots(&mut conn, schedule.id).await?;
        Ok(WorkoutScheduleDetail { schedule, slots })
    }

    pub async fn list(&self, owner_id: i64, page: &Pagination) -> AppResult<ListResult<WorkoutSchedule>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(format!(
            "SELECT {SCHEDULE_COLUMNS} FROM workout_schedule WHERE COALESCE(d, 0) = 0 AND owner_id = "
        ));
        query.push_bind(owner_id);
        fetch_page(&self.db, query, "id", &window).await
    }

    /// Applies a schedule for the coach. Re-applying a cancelled one
    /// reactivates it; applying an applied one conflicts.
    pub async fn apply(&self, coach_id: i64, schedule_id: i64) -> AppResult<CoachWorkoutSchedule> {
        let schedule = self.find(schedule_id).await?;
        ensure_can_view(&self.db, coach_id, schedule.owner_id).await?;

        let applied: Option<CoachWorkoutSchedule> = sqlx::query_as(
            r#"
            INSERT INTO coach_workout_schedule (coach_id, workout_schedule_id, status, applied_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (coach_id, workout_schedule_id) DO UPDATE
                SET status = EXCLUDED.status, applied_at = EXCLUDED.applied_at, cancelled_at = NULL
                WHERE coach_workout_schedule.status <> EXCLUDED.status
            RETURNING id, coach_id, workout_schedule_id, status, applied_at, cancelled_at
            "#,
        )
        .bind(coach_id)
        .bind(schedule.id)
        .bind(ScheduleApplyStatus::Applied)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        let applied = applied.ok_or_else(|| AppError::conflict("schedule already applied"))?;
        tracing::info!(coach_id, schedule_id, "Applied workout schedule");
        Ok(applied)
    }

    pub async fn cancel(&self, coach_id: i64, schedule_id: i64) -> AppResult<CoachWorkoutSchedule> {
        let cancelled: Option<CoachWorkoutSchedule> = sqlx::query_as(
            r#"
            UPDATE coach_workout_schedule SET status = $3, cancelled_at = $4
            WHERE coach_id = $1 AND workout_schedule_id = $2 AND status = $5
            RETURNING id, coach_id, workout_schedule_id, status, applied_at, cancelled_at
            "#,
        )
        .bind(coach_id)
        .bind(schedule_id)
        .bind(ScheduleApplyStatus::Cancelled)
        .bind(Utc::now())
        .bind(ScheduleApplyStatus::Applied)
        .fetch_optional(&self.db)
        .await?;

        let cancelled = cancelled.ok_or_else(|| AppError::invalid_state("schedule is not applied"))?;
        tracing::info!(coach_id, schedule_id, "Cancelled workout schedule");
        Ok(cancelled)
    }

    async fn find(&self, schedule_id: i64) -> AppResult<WorkoutSchedule> {
        sqlx::query_as(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM workout_schedule WHERE id = $1 AND COALESCE(d, 0) = 0"
        ))
        .bind(schedule_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("workout schedule"))
    }
}

async fn ensure_plans_exist(conn: &mut PgConnection, slots: &[SlotRow]) -> AppResult<()> {
    let mut ids: Vec<i64> = slots.iter().map(|s| s.workout_plan_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }

    let (found,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM workout_plan WHERE id = ANY($1) AND COALESCE(d, 0) = 0",
    )
    .bind(&ids)
    .fetch_one(&mut *conn)
    .await?;

    if found != ids.len() as i64 {
        return Err(AppError::bad_request("schedule references a missing workout plan"));
    }
    Ok(())
}

async fn insert_slots(conn: &mut PgConnection, schedule_id: i64, slots: &[SlotRow]) -> AppResult<()> {
    if slots.is_empty() {
        return Ok(());
    }

    let mut query = QueryBuilder::new(
        "INSERT INTO workout_plan_in_schedule (workout_schedule_id, workout_plan_id, weekday, day, idx) ",
    );
    query.push_values(slots, |mut row, slot| {
        row.push_bind(schedule_id)
            .push_bind(slot.workout_plan_id)
            .push_bind(slot.weekday)
            .push_bind(slot.day)
            .push_bind(slot.idx);
    });
    query.build().execute(&mut *conn).await?;
    Ok(())
}

async fn fetch_slots(conn: &mut PgConnection, schedule_id: i64) -> AppResult<Vec<ScheduleSlot>> {
    let slots = sqlx::query_as(
        r#"
        SELECT s.id, s.workout_plan_id, COALESCE(p.title, '') AS plan_title, s.weekday, s.day, s.idx
        FROM workout_plan_in_schedule s
        LEFT JOIN workout_plan p ON p.id = s.workout_plan_id
        WHERE s.workout_schedule_id = $1
        ORDER BY s.idx ASC
        "#,
    )
    .bind(schedule_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(slots)
}
