use chrono::Utc;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{
    canonical_code, generate_gift_code, GiftCard, GiftCardStatus, RedeemResponse, RewardDetails,
    MAX_SUBSCRIPTION_DAYS,
};
use crate::services::subscription_service;

pub const GIFT_CARD_REASON: &str = "gift-card redemption";

/// Attempts per code before giving up on finding an unused one.
const MAX_CODE_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct GiftCardService {
    db: PgPool,
}

impl GiftCardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Redeems a card for `coach_id`. The card row stays locked until commit,
    /// so concurrent attempts on one code succeed at most once.
    pub async fn redeem(&self, coach_id: i64, code: &str) -> AppResult<RedeemResponse> {
        let code = canonical_code(code);
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let card: GiftCard = sqlx::query_as(
            r#"
            SELECT id, code, status, reward_id, consumer_id, used_at
            FROM gift_card
            WHERE code = $1 AND COALESCE(d, 0) = 0
            FOR UPDATE
            "#,
        )
        .bind(&code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("gift card"))?;

        card.ensure_redeemable()?;

        let (details,): (String,) = sqlx::query_as("SELECT details FROM gift_card_reward WHERE id = $1")
            .bind(card.reward_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::malformed(format!("gift card {} has no reward", card.id)))?;
        let reward = RewardDetails::parse(&details)?;

        let plan: Option<(i64,)> = sqlx::query_as("SELECT id FROM subscription_plan WHERE id = $1")
            .bind(reward.subscription_plan_id)
            .fetch_optional(&mut *tx)
            .await?;
        if plan.is_none() {
            return Err(AppError::malformed(format!(
                "gift card reward references unknown plan {}",
                reward.subscription_plan_id
            )));
        }

        let subscription = subscription_service::grant(
            &mut tx,
            coach_id,
            reward.subscription_plan_id,
            reward.day_count,
            GIFT_CARD_REASON,
            now,
        )
        .await?;

        sqlx::query("UPDATE gift_card SET status = $2, consumer_id = $3, used_at = $4 WHERE id = $1")
            .bind(card.id)
            .bind(GiftCardStatus::Used)
            .bind(coach_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(coach_id, card_id = card.id, subscription_id = subscription.id, "Redeemed gift card");

        Ok(RedeemResponse { subscription })
    }

    /// Creates one reward and `count` unused cards pointing at it.
    pub async fn generate(&self, plan_id: i64, day_count: i32, count: usize) -> AppResult<Vec<String>> {
        let reward = RewardDetails {
            subscription_plan_id: plan_id,
            day_count,
        };
        if !reward.is_valid() {
            return Err(AppError::bad_request(format!(
                "plan id must be positive and day count within 1..={MAX_SUBSCRIPTION_DAYS}"
            )));
        }

        let mut tx = self.db.begin().await?;

        let plan: Option<(i64,)> = sqlx::query_as("SELECT id FROM subscription_plan WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await?;
        if plan.is_none() {
            return Err(AppError::NotFound("subscription plan"));
        }

        let (reward_id,): (i64,) =
            sqlx::query_as("INSERT INTO gift_card_reward (reward_type, details) VALUES (1, $1) RETURNING id")
                .bind(reward.to_json())
                .fetch_one(&mut *tx)
                .await?;

        let mut codes = Vec::with_capacity(count);
        for _ in 0..count {
            let mut inserted = None;
            for _ in 0..MAX_CODE_ATTEMPTS {
                let candidate = generate_gift_code(&mut rand::thread_rng());
                let row: Option<(String,)> = sqlx::query_as(
                    r#"
                    INSERT INTO gift_card (code, status, reward_id) VALUES ($1, $2, $3)
                    ON CONFLICT (code) DO NOTHING
                    RETURNING code
                    "#,
                )
                .bind(&candidate)
                .bind(GiftCardStatus::Unused)
                .bind(reward_id)
                .fetch_optional(&mut *tx)
                .await?;
                if let Some((code,)) = row {
                    inserted = Some(code);
                    break;
                }
            }
            let code = inserted.ok_or_else(|| anyhow::anyhow!("could not find an unused gift code"))?;
            codes.push(code);
        }

        tx.commit().await?;
        tracing::info!(plan_id, day_count, count = codes.len(), reward_id, "Generated gift cards");
        Ok(codes)
    }
}
