use anyhow::Result;
use sqlx::PgPool;

/// Default pricing tiers: (days required, rate percent).
const DEFAULT_TIERS: [(i32, i32); 3] = [(30, 100), (120, 90), (360, 80)];

/// Seeds the subscription pricing catalog on a fresh database.
pub struct CatalogSeeder {
    pool: PgPool,
}

impl CatalogSeeder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the standard plan and its discount tiers unless a plan already
    /// exists. Returns the id of the plan that was created.
    pub async fn seed_pricing(&self, plan_name: &str, unit_price: i64) -> Result<Option<i64>> {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM subscription_plan ORDER BY id ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        if let Some((id,)) = existing {
            tracing::info!(plan_id = id, "Pricing catalog already seeded");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let (plan_id,): (i64,) = sqlx::query_as(
            "INSERT INTO subscription_plan (name, unit_price) VALUES ($1, $2) RETURNING id",
        )
        .bind(plan_name)
        .bind(unit_price)
        .fetch_one(&mut *tx)
        .await?;

        for (count_require, rate) in DEFAULT_TIERS {
            let (policy_id,): (i64,) = sqlx::query_as(
                "INSERT INTO discount_policy (name, count_require, rate) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(format!("{count_require} days at {rate}%"))
            .bind(count_require)
            .bind(rate)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO subscription_plan_discount_policy (subscription_plan_id, discount_policy_id, enabled)
                 VALUES ($1, $2, TRUE)",
            )
            .bind(plan_id)
            .bind(policy_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(plan_id, "Seeded pricing catalog");
        Ok(Some(plan_id))
    }
}
