use std::sync::Arc;

use chrono::Utc;
use sqlx::{PgConnection, PgPool, QueryBuilder};

use crate::auth::password::hash_password;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    normalize_avatar_url, random_nickname, Coach, CoachProfile1, CoachRelationship, CreateStudentRequest,
    CreatedStudent, ListResult, Pagination, ProfileResponse, RelationshipRole, RelationshipStatus,
    StudentListItem, UpdateProfileRequest, UpdateRelationshipRequest, PROVIDER_EMAIL_PASSWORD,
};
use crate::services::content_filter::ContentFilter;
use crate::services::pagination::fetch_page;
use crate::services::subscription_service;

const COACH_COLUMNS: &str = "id, nickname, avatar_url, bio, profile1_id, created_at";
const PROFILE_COLUMNS: &str = "id, coach_id, avatar_url, gender, height, weight, birthday, goal";

#[derive(Clone)]
pub struct CoachService {
    db: PgPool,
    config: Arc<AppConfig>,
    content_filter: Arc<dyn ContentFilter>,
}

impl CoachService {
    pub fn new(db: PgPool, config: Arc<AppConfig>, content_filter: Arc<dyn ContentFilter>) -> Self {
        Self {
            db,
            config,
            content_filter,
        }
    }

    /// Coach, body profile and current subscription. Promotes a due
    /// subscription within the same transaction.
    pub async fn get_profile(&self, coach_id: i64) -> AppResult<ProfileResponse> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let coach = lock_coach(&mut tx, coach_id).await?;
        let profile_id = ensure_profile(&mut tx, &coach, &self.config.default_avatar_url).await?;
        let profile = fetch_profile(&mut tx, profile_id).await?;
        let subscription = subscription_service::refresh(&mut tx, coach_id, now).await?;

        tx.commit().await?;

        let coach = Coach {
            profile1_id: profile_id,
            ..coach
        };
        Ok(ProfileResponse {
            coach,
            profile,
            subscription,
        })
    }

    pub async fn update_profile(&self, coach_id: i64, request: UpdateProfileRequest) -> AppResult<ProfileResponse> {
        if let Some(nickname) = &request.nickname {
            self.content_filter.check("nickname", nickname)?;
        }
        if let Some(bio) = &request.bio {
            self.content_filter.check("bio", bio)?;
        }
        let avatar_url = request
            .avatar_url
            .as_deref()
            .map(|url| normalize_avatar_url(&self.config.default_avatar_url, url));

        let mut tx = self.db.begin().await?;
        let coach = lock_coach(&mut tx, coach_id).await?;
        let profile_id = ensure_profile(&mut tx, &coach, &self.config.default_avatar_url).await?;

        sqlx::query(
            r#"
            UPDATE coach SET
                nickname = COALESCE($2, nickname),
                avatar_url = COALESCE($3, avatar_url),
                bio = COALESCE($4, bio),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(coach_id)
        .bind(request.nickname.as_deref().map(str::trim))
        .bind(avatar_url.as_deref())
        .bind(request.bio.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE coach_profile1 SET
                avatar_url = COALESCE($2, avatar_url),
                gender = COALESCE($3, gender),
                height = COALESCE($4, height),
                weight = COALESCE($5, weight),
                birthday = COALESCE($6, birthday),
                goal = COALESCE($7, goal),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(profile_id)
        .bind(avatar_url.as_deref())
        .bind(request.gender)
        .bind(request.height)
        .bind(request.weight)
        .bind(request.birthday)
        .bind(request.goal.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(coach_id, "Updated coach profile");

        self.get_profile(coach_id).await
    }

    /// Creates a coach without an account plus a pending coach-student edge.
    pub async fn create_student(&self, coach_id: i64, request: CreateStudentRequest) -> AppResult<CreatedStudent> {
        self.content_filter.check("nickname", &request.nickname)?;

        let mut tx = self.db.begin().await?;
        lock_coach(&mut tx, coach_id).await?;

        let student = insert_coach(&mut tx, request.nickname.trim(), &self.config.default_avatar_url).await?;
        sqlx::query(
            r#"
            UPDATE coach_profile1 SET gender = $2, height = $3, weight = $4, birthday = $5, goal = $6
            WHERE id = $1
            "#,
        )
        .bind(student.profile1_id)
        .bind(request.gender)
        .bind(request.height)
        .bind(request.weight)
        .bind(request.birthday)
        .bind(&request.goal)
        .execute(&mut *tx)
        .await?;

        let (relationship_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO coach_relationship (coach_id, student_id, status, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(coach_id)
        .bind(student.id)
        .bind(RelationshipStatus::Pending)
        .bind(RelationshipRole::CoachStudent)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(coach_id, student_id = student.id, relationship_id, "Created student");

        Ok(CreatedStudent {
            student_id: student.id,
            relationship_id,
        })
    }

    pub async fn list_students(&self, coach_id: i64, page: &Pagination) -> AppResult<ListResult<StudentListItem>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(
            r#"
            SELECT r.id, r.student_id, c.nickname, c.avatar_url, r.status, r.role, r.created_at
            FROM coach_relationship r
            JOIN coach c ON c.id = r.student_id
            WHERE COALESCE(r.d, 0) = 0 AND COALESCE(c.d, 0) = 0 AND r.coach_id = "#,
        );
        query.push_bind(coach_id);
        fetch_page(&self.db, query, "r.id", &window).await
    }

    pub async fn update_relationship_status(
        &self,
        caller: i64,
        request: UpdateRelationshipRequest,
    ) -> AppResult<CoachRelationship> {
        let mut tx = self.db.begin().await?;

        let relationship: CoachRelationship = sqlx::query_as(
            r#"
            SELECT id, coach_id, student_id, status, role, created_at
            FROM coach_relationship
            WHERE id = $1 AND COALESCE(d, 0) = 0
            FOR UPDATE
            "#,
        )
        .bind(request.relationship_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("relationship"))?;

        let side = relationship
            .side_of(caller)
            .ok_or_else(|| AppError::unauthorized("not a member of this relationship"))?;
        let next = relationship.status.transition(side, request.status)?;

        sqlx::query("UPDATE coach_relationship SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(relationship.id)
            .bind(next)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(relationship_id = relationship.id, from = ?relationship.status, to = ?next, "Relationship status changed");
        Ok(CoachRelationship {
            status: next,
            ..relationship
        })
    }

    /// Replaces the password of an email account. Used by the admin CLI.
    pub async fn reset_password(&self, email: &str, password: &str) -> AppResult<i64> {
        let hash = hash_password(password.to_string(), self.config.bcrypt_cost).await?;
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE coach_account SET provider_arg1 = $3
            WHERE provider_type = $1 AND provider_id = $2
            RETURNING coach_id
            "#,
        )
        .bind(PROVIDER_EMAIL_PASSWORD)
        .bind(email.trim())
        .bind(hash)
        .fetch_optional(&self.db)
        .await?;

        let (coach_id,) = updated.ok_or(AppError::NotFound("account"))?;
        tracing::info!(coach_id, "Password reset");
        Ok(coach_id)
    }
}

pub async fn lock_coach(conn: &mut PgConnection, coach_id: i64) -> AppResult<Coach> {
    sqlx::query_as(&format!(
        "SELECT {COACH_COLUMNS} FROM coach WHERE id = $1 AND COALESCE(d, 0) = 0 FOR UPDATE"
    ))
    .bind(coach_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("coach"))
}

/// Inserts a coach with a random-or-given nickname and its body profile.
pub async fn insert_coach(conn: &mut PgConnection, nickname: &str, avatar_url: &str) -> AppResult<Coach> {
    let nickname = if nickname.is_empty() {
        random_nickname(&mut rand::thread_rng())
    } else {
        nickname.to_string()
    };

    let coach: Coach = sqlx::query_as(&format!(
        "INSERT INTO coach (nickname, avatar_url) VALUES ($1, $2) RETURNING {COACH_COLUMNS}"
    ))
    .bind(&nickname)
    .bind(avatar_url)
    .fetch_one(&mut *conn)
    .await?;

    let profile_id = ensure_profile(conn, &coach, avatar_url).await?;
    Ok(Coach {
        profile1_id: profile_id,
        ..coach
    })
}

/// Attaches a body profile to a coach whose `profile1_id` is unset, adopting
/// an orphan profile when one exists. Returns the profile id.
pub async fn ensure_profile(conn: &mut PgConnection, coach: &Coach, default_avatar: &str) -> AppResult<i64> {
    if coach.profile1_id != 0 {
        return Ok(coach.profile1_id);
    }

    let orphan: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM coach_profile1 WHERE coach_id = $1 ORDER BY id ASC LIMIT 1")
            .bind(coach.id)
            .fetch_optional(&mut *conn)
            .await?;

    let profile_id = match orphan {
        Some((id,)) => {
            tracing::info!(coach_id = coach.id, profile_id = id, "Attached orphan profile");
            id
        }
        None => {
            let (id,): (i64,) =
                sqlx::query_as("INSERT INTO coach_profile1 (coach_id, avatar_url) VALUES ($1, $2) RETURNING id")
                    .bind(coach.id)
                    .bind(default_avatar)
                    .fetch_one(&mut *conn)
                    .await?;
            id
        }
    };

    sqlx::query("UPDATE coach SET profile1_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(coach.id)
        .bind(profile_id)
        .execute(&mut *conn)
        .await?;

    Ok(profile_id)
}

async fn fetch_profile(conn: &mut PgConnection, profile_id: i64) -> AppResult<CoachProfile1> {
    sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM coach_profile1 WHERE id = $1"))
        .bind(profile_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::malformed(format!("coach profile {profile_id} is missing")))
}
