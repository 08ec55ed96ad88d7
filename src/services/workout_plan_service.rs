use serde_json::Value;
use sqlx::{PgPool, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateWorkoutPlanRequest, ListResult, Pagination, PlanDetails, UpdateWorkoutPlanRequest, WorkoutPlan,
    WorkoutPlanDetail, WorkoutPlanPatch,
};
use crate::services::access::ensure_can_view;
use crate::services::pagination::fetch_page;

const PLAN_COLUMNS: &str = "id, title, overview, type, tags, details, owner_id, created_at, updated_at";

/// Validates incoming plan content and returns its normalized encoding.
pub fn normalize_details(details: Option<Value>) -> AppResult<String> {
    let details = match details {
        Some(Value::Null) | None => PlanDetails::empty(),
        Some(value) => PlanDetails::from_value(value).map_err(|e| e.into_bad_request())?,
    };
    Ok(details.to_json()?)
}

#[derive(Clone)]
pub struct WorkoutPlanService {
    db: PgPool,
}

impl WorkoutPlanService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner_id: i64, request: CreateWorkoutPlanRequest) -> AppResult<WorkoutPlanDetail> {
        let details = normalize_details(request.details)?;

        let plan: WorkoutPlan = sqlx::query_as(&format!(
            r#"
            INSERT INTO workout_plan (title, overview, type, tags, details, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(request.title.trim())
        .bind(&request.overview)
        .bind(request.plan_type)
        .bind(&request.tags)
        .bind(&details)
        .bind(owner_id)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(owner_id, plan_id = plan.id, "Created workout plan");
        with_details(plan)
    }

    pub async fn update(&self, owner_id: i64, request: UpdateWorkoutPlanRequest) -> AppResult<WorkoutPlanDetail> {
        let patch = WorkoutPlanPatch {
            title: request.title.map(|t| t.trim().to_string()),
            overview: request.overview,
            plan_type: request.plan_type,
            tags: request.tags,
            details: match request.details {
                Some(value) => Some(normalize_details(Some(value))?),
                None => None,
            },
        };

        let existing = self.find(request.id).await?;
        if existing.owner_id != owner_id {
            return Err(AppError::unauthorized("only the owner may edit this plan"));
        }

        let plan: WorkoutPlan = sqlx::query_as(&format!(
            r#"
            UPDATE workout_plan SET
                title = COALESCE($2, title),
                overview = COALESCE($3, overview),
                type = COALESCE($4, type),
                tags = COALESCE($5, tags),
                details = COALESCE($6, details),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(patch.title)
        .bind(patch.overview)
        .bind(patch.plan_type)
        .bind(patch.tags)
        .bind(patch.details)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(owner_id, plan_id = plan.id, "Updated workout plan");
        with_details(plan)
    }

    pub async fn get(&self, viewer: i64, plan_id: i64) -> AppResult<WorkoutPlanDetail> {
        let plan = self.find(plan_id).await?;
        ensure_can_view(&self.db, viewer, plan.owner_id).await?;
        with_details(plan)
    }

    pub async fn list(&self, viewer: i64, owner_id: Option<i64>, page: &Pagination) -> AppResult<ListResult<WorkoutPlan>> {
        let window = page.window()?;
        let owner_id = owner_id.unwrap_or(viewer);
        ensure_can_view(&self.db, viewer, owner_id).await?;

        let mut query = QueryBuilder::new(format!(
            "SELECT {PLAN_COLUMNS} FROM workout_plan WHERE COALESCE(d, 0) = 0 AND owner_id = "
        ));
        query.push_bind(owner_id);
        fetch_page(&self.db, query, "id", &window).await
    }

    pub async fn delete(&self, owner_id: i64, plan_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE workout_plan SET d = 1, updated_at = NOW() WHERE id = $1 AND owner_id = $2 AND COALESCE(d, 0) = 0",
        )
        .bind(plan_id)
        .bind(owner_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("workout plan"));
        }
        tracing::info!(owner_id, plan_id, "Deleted workout plan");
        Ok(())
    }

    async fn find(&self, plan_id: i64) -> AppResult<WorkoutPlan> {
        sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM workout_plan WHERE id = $1 AND COALESCE(d, 0) = 0"
        ))
        .bind(plan_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("workout plan"))
    }
}

fn with_details(plan: WorkoutPlan) -> AppResult<WorkoutPlanDetail> {
    let details = PlanDetails::parse(&plan.details)?;
    Ok(WorkoutPlanDetail { plan, details })
}
