use sqlx::PgExecutor;

use crate::error::{AppError, AppResult};

/// True iff `viewer == target` or a live relationship joins them in
/// either direction.
pub async fn can_view<'c>(executor: impl PgExecutor<'c>, viewer: i64, target: i64) -> AppResult<bool> {
    if viewer == target {
        return Ok(true);
    }

    let (linked,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM coach_relationship
            WHERE COALESCE(d, 0) = 0
              AND ((coach_id = $1 AND student_id = $2) OR (coach_id = $2 AND student_id = $1))
        )
        "#,
    )
    .bind(viewer)
    .bind(target)
    .fetch_one(executor)
    .await?;

    Ok(linked)
}

pub async fn ensure_can_view<'c>(executor: impl PgExecutor<'c>, viewer: i64, target: i64) -> AppResult<()> {
    if can_view(executor, viewer, target).await? {
        Ok(())
    } else {
        tracing::warn!(viewer, target, "relationship gate denied access");
        Err(AppError::unauthorized("no relationship with this coach"))
    }
}

/// Succeeds when `coach` may author sessions for `student`: the same coach, or a
/// live coach→student edge.
pub async fn ensure_coaches<'c>(executor: impl PgExecutor<'c>, coach: i64, student: i64) -> AppResult<()> {
    if coach == student {
        return Ok(());
    }

    let (linked,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM coach_relationship
            WHERE COALESCE(d, 0) = 0 AND coach_id = $1 AND student_id = $2
        )
        "#,
    )
    .bind(coach)
    .bind(student)
    .fetch_one(executor)
    .await?;

    if linked {
        Ok(())
    } else {
        tracing::warn!(coach, student, "coach has no relationship with student");
        Err(AppError::unauthorized(format!("coach {coach} does not coach student {student}")))
    }
}
