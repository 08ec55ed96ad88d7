use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, QueryBuilder};

use crate::error::{AppError, AppResult};
use crate::models::{
    calc_order_amount, expiry_after, BillingPeriod, DiscountTier, ListResult, OrderAmount, Pagination,
    Placement, Promotion, Subscription, SubscriptionPlan, SubscriptionStep, SubscriptionSummary,
};
use crate::services::pagination::fetch_page;

const SUBSCRIPTION_COLUMNS: &str = "id, coach_id, subscription_plan_id, step, count, reason, active_at, expect_expired_at, expired_at, created_at";

#[derive(Clone)]
pub struct SubscriptionService {
    db: PgPool,
}

impl SubscriptionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, coach_id: i64, page: &Pagination) -> AppResult<ListResult<Subscription>> {
        let window = page.window()?;
        let mut query = QueryBuilder::new(format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE coach_id = "));
        query.push_bind(coach_id);
        fetch_page(&self.db, query, "id", &window).await
    }

    /// Prices `period` against the plan's enabled discount tiers. Without a
    /// plan id the oldest plan is used.
    pub async fn calc_order_amount(&self, plan_id: Option<i64>, period: BillingPeriod) -> AppResult<OrderAmount> {
        let plan: Option<SubscriptionPlan> = match plan_id {
            Some(id) => {
                sqlx::query_as("SELECT id, name, unit_price FROM subscription_plan WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.db)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT id, name, unit_price FROM subscription_plan ORDER BY id ASC LIMIT 1")
                    .fetch_optional(&self.db)
                    .await?
            }
        };
        let plan = plan.ok_or(AppError::NotFound("subscription plan"))?;

        let tiers: Vec<DiscountTier> = sqlx::query_as(
            r#"
            SELECT dp.count_require, dp.rate
            FROM discount_policy dp
            JOIN subscription_plan_discount_policy spdp ON spdp.discount_policy_id = dp.id
            WHERE spdp.subscription_plan_id = $1 AND spdp.enabled
            "#,
        )
        .bind(plan.id)
        .fetch_all(&self.db)
        .await?;

        calc_order_amount(plan.unit_price, &tiers, period)
    }

    /// Gate for features that need a paid slot. A lapsed subscription with a
    /// queued successor is promoted first so the successor counts.
    pub async fn ensure_active(&self, coach_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let subscriptions = promote(&mut tx, coach_id, now).await?;
        tx.commit().await?;

        if subscriptions.iter().any(|s| s.is_live(now)) {
            Ok(())
        } else {
            Err(AppError::SubscriptionRequired)
        }
    }
}

/// Serializes subscription changes for one coach by locking the coach row,
/// then returns all of their subscriptions.
pub async fn lock_subscriptions(conn: &mut PgConnection, coach_id: i64) -> AppResult<Vec<Subscription>> {
    let locked: Option<(i64,)> = sqlx::query_as("SELECT id FROM coach WHERE id = $1 FOR UPDATE")
        .bind(coach_id)
        .fetch_optional(&mut *conn)
        .await?;
    if locked.is_none() {
        return Err(AppError::NotFound("coach"));
    }

    let subscriptions = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscription WHERE coach_id = $1 ORDER BY id ASC FOR UPDATE"
    ))
    .bind(coach_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(subscriptions)
}

/// Adds a subscription to the coach's queue: active immediately when no
/// active one exists, pending otherwise.
pub async fn grant(
    conn: &mut PgConnection,
    coach_id: i64,
    plan_id: i64,
    count: i32,
    reason: &str,
    now: DateTime<Utc>,
) -> AppResult<Subscription> {
    let existing = lock_subscriptions(conn, coach_id).await?;
    let has_active = existing
        .iter()
        .any(|s| s.step == SubscriptionStep::Active && s.expired_at.is_none());

    let placement = Placement::decide(has_active, count, now)?;
    let (active_at, expect_expired_at) = match placement {
        Placement::Queued => (None, None),
        Placement::ActiveNow {
            active_at,
            expect_expired_at,
        } => (Some(active_at), Some(expect_expired_at)),
    };

    let subscription: Subscription = sqlx::query_as(&format!(
        r#"
        INSERT INTO subscription (coach_id, subscription_plan_id, step, count, reason, active_at, expect_expired_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {SUBSCRIPTION_COLUMNS}
        "#
    ))
    .bind(coach_id)
    .bind(plan_id)
    .bind(placement.step())
    .bind(count)
    .bind(reason)
    .bind(active_at)
    .bind(expect_expired_at)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        coach_id,
        subscription_id = subscription.id,
        step = ?subscription.step,
        count,
        reason,
        "Granted subscription"
    );
    Ok(subscription)
}

/// Applies at most one expire/activate step and returns the active
/// subscription summary, if any. Must run inside the caller's transaction.
pub async fn refresh(
    conn: &mut PgConnection,
    coach_id: i64,
    now: DateTime<Utc>,
) -> AppResult<Option<SubscriptionSummary>> {
    let subscriptions = promote(conn, coach_id, now).await?;

    let pending = subscriptions
        .iter()
        .filter(|s| s.step == SubscriptionStep::Pending)
        .count() as i64;
    Ok(subscriptions
        .iter()
        .filter(|s| s.step == SubscriptionStep::Active)
        .max_by_key(|s| s.id)
        .map(|active| SubscriptionSummary::new(active, pending)))
}

/// Locks the coach's subscriptions, applies the due promotion and returns
/// the rows as they stand afterwards.
async fn promote(conn: &mut PgConnection, coach_id: i64, now: DateTime<Utc>) -> AppResult<Vec<Subscription>> {
    let mut subscriptions = lock_subscriptions(conn, coach_id).await?;
    let promotion = Promotion::plan(&subscriptions, now);
    if promotion.is_noop() {
        return Ok(subscriptions);
    }

    if let Some(id) = promotion.expire {
        sqlx::query("UPDATE subscription SET step = $1, expired_at = $2 WHERE id = $3")
            .bind(SubscriptionStep::Expired)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if let Some(s) = subscriptions.iter_mut().find(|s| s.id == id) {
            s.step = SubscriptionStep::Expired;
            s.expired_at = Some(now);
        }
        tracing::info!(coach_id, subscription_id = id, "Subscription expired");
    }

    if let Some(id) = promotion.activate {
        if let Some(s) = subscriptions.iter_mut().find(|s| s.id == id) {
            let expect = expiry_after(now, s.count)?;
            sqlx::query("UPDATE subscription SET step = $1, active_at = $2, expect_expired_at = $3 WHERE id = $4")
                .bind(SubscriptionStep::Active)
                .bind(now)
                .bind(expect)
                .bind(id)
                .execute(&mut *conn)
                .await?;
            s.step = SubscriptionStep::Active;
            s.active_at = Some(now);
            s.expect_expired_at = Some(expect);
            tracing::info!(coach_id, subscription_id = id, "Activated queued subscription");
        }
    }

    Ok(subscriptions)
}

pub async fn first_plan_id(conn: &mut PgConnection) -> AppResult<Option<i64>> {
    let plan: Option<(i64,)> = sqlx::query_as("SELECT id FROM subscription_plan ORDER BY id ASC LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    Ok(plan.map(|(id,)| id))
}
