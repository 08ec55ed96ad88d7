use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{AuthError, AuthResponse, JwtService, LoginRequest, RegisterRequest};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{CoachAccount, PROVIDER_EMAIL_PASSWORD};
use crate::services::{coach_service, subscription_service};

pub const SIGNUP_GIFT_DAYS: i32 = 30;
pub const SIGNUP_GIFT_REASON: &str = "signup gift";

#[derive(Clone)]
pub struct AuthService {
    jwt_service: JwtService,
    config: Arc<AppConfig>,
    db: PgPool,
}

impl AuthService {
    pub fn new(db: PgPool, jwt_service: JwtService, config: Arc<AppConfig>) -> Self {
        Self {
            jwt_service,
            config,
            db,
        }
    }

    /// Register a new coach with an email account. Grants the signup
    /// subscription when a plan exists.
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_string();
        if self.find_account(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyUsed.into());
        }

        let password_hash = hash_password(request.password, self.config.bcrypt_cost).await?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let coach = coach_service::insert_coach(&mut tx, "", &self.config.default_avatar_url).await?;

        sqlx::query(
            r#"
            INSERT INTO coach_account (provider_type, provider_id, provider_arg1, coach_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(PROVIDER_EMAIL_PASSWORD)
        .bind(&email)
        .bind(&password_hash)
        .bind(coach.id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
                AppError::from(AuthError::EmailAlreadyUsed)
            } else {
                AppError::from(err)
            }
        })?;

        if let Some(plan_id) = subscription_service::first_plan_id(&mut tx).await? {
            subscription_service::grant(&mut tx, coach.id, plan_id, SIGNUP_GIFT_DAYS, SIGNUP_GIFT_REASON, now)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(coach_id = coach.id, "Registered coach");

        self.issue(coach.id)
    }

    /// Login with email and password
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let account = self
            .find_account(request.email.trim())
            .await?
            .ok_or(AppError::NotFound("account"))?;

        if !verify_password(request.password, account.provider_arg1).await? {
            tracing::info!(coach_id = account.coach_id, "Rejected login with bad credentials");
            return Err(AuthError::InvalidCredentials.into());
        }

        self.issue(account.coach_id)
    }

    async fn find_account(&self, email: &str) -> AppResult<Option<CoachAccount>> {
        let account = sqlx::query_as(
            r#"
            SELECT id, coach_id, provider_arg1
            FROM coach_account
            WHERE provider_type = $1 AND provider_id = $2
            "#,
        )
        .bind(PROVIDER_EMAIL_PASSWORD)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    fn issue(&self, coach_id: i64) -> AppResult<AuthResponse> {
        let (token, expires_at) = self.jwt_service.create_token(coach_id, Utc::now())?;
        Ok(AuthResponse {
            token,
            coach_id,
            expires_at,
        })
    }
}
