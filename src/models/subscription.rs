use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::pagination::Identified;
use crate::error::{AppError, AppResult};

int_enum! {
    pub enum SubscriptionStep {
        Pending = 1,
        Active = 2,
        Expired = 3,
    }
}

pub const DEFAULT_RATE: i32 = 100;

/// Longest single grant, in days.
pub const MAX_SUBSCRIPTION_DAYS: i32 = 3650;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub coach_id: i64,
    pub subscription_plan_id: i64,
    pub step: SubscriptionStep,
    pub count: i32,
    pub reason: String,
    pub active_at: Option<DateTime<Utc>>,
    pub expect_expired_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Identified for Subscription {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Subscription {
    /// Active and not yet past its expected expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.step == SubscriptionStep::Active
            && self.expired_at.is_none()
            && self.expect_expired_at.map_or(false, |at| at > now)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.step == SubscriptionStep::Active && self.expect_expired_at.map_or(true, |at| now >= at)
    }
}

pub fn expiry_after(start: DateTime<Utc>, days: i32) -> AppResult<DateTime<Utc>> {
    start
        .checked_add_signed(Duration::days(days as i64))
        .ok_or_else(|| AppError::malformed(format!("subscription of {days} days overflows its expiry")))
}

/// How a newly granted subscription enters a coach's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Queued,
    ActiveNow {
        active_at: DateTime<Utc>,
        expect_expired_at: DateTime<Utc>,
    },
}

impl Placement {
    pub fn decide(has_active: bool, count: i32, now: DateTime<Utc>) -> AppResult<Self> {
        if has_active {
            return Ok(Placement::Queued);
        }
        Ok(Placement::ActiveNow {
            active_at: now,
            expect_expired_at: expiry_after(now, count)?,
        })
    }

    pub fn step(&self) -> SubscriptionStep {
        match self {
            Placement::Queued => SubscriptionStep::Pending,
            Placement::ActiveNow { .. } => SubscriptionStep::Active,
        }
    }
}

/// Row changes that bring a coach's subscriptions up to date at `now`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Promotion {
    pub expire: Option<i64>,
    pub activate: Option<i64>,
}

impl Promotion {
    /// Expires the latest active subscription when it is due and activates
    /// the oldest pending one in its place. At most one of each per call.
    pub fn plan(subscriptions: &[Subscription], now: DateTime<Utc>) -> Self {
        let latest_active = subscriptions
            .iter()
            .filter(|s| s.step == SubscriptionStep::Active)
            .max_by_key(|s| s.id);

        let expire = match latest_active {
            Some(s) if s.is_due(now) => Some(s.id),
            Some(_) => return Promotion::default(),
            None => None,
        };

        let activate = subscriptions
            .iter()
            .filter(|s| s.step == SubscriptionStep::Pending)
            .min_by_key(|s| s.id)
            .map(|s| s.id);

        Promotion { expire, activate }
    }

    pub fn is_noop(&self) -> bool {
        self.expire.is_none() && self.activate.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub id: i64,
    pub plan_id: i64,
    pub status: SubscriptionStep,
    pub count: i32,
    pub active_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub pending_count: i64,
}

impl SubscriptionSummary {
    pub fn new(active: &Subscription, pending_count: i64) -> Self {
        Self {
            id: active.id,
            plan_id: active.subscription_plan_id,
            status: active.step,
            count: active.count,
            active_at: active.active_at,
            expired_at: active.expect_expired_at,
            pending_count,
        }
    }
}

// Pricing

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct DiscountTier {
    pub count_require: i32,
    pub rate: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Month,
    Season,
    Year,
}

impl BillingPeriod {
    pub fn days(self) -> i32 {
        match self {
            BillingPeriod::Month => 30,
            BillingPeriod::Season => 120,
            BillingPeriod::Year => 360,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CalcOrderRequest {
    #[serde(default)]
    pub plan_id: Option<i64>,
    #[serde(rename = "type")]
    pub period: BillingPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAmount {
    pub count: i32,
    pub total_amount: i64,
    pub amount: i64,
    pub discount: i64,
    pub discount_text: String,
    pub human_text: String,
}

/// Picks the highest-threshold tier the day count qualifies for.
pub fn select_rate(tiers: &[DiscountTier], count: i32) -> i32 {
    let mut sorted = tiers.to_vec();
    sorted.sort_by(|a, b| b.count_require.cmp(&a.count_require));
    sorted
        .into_iter()
        .find(|tier| tier.count_require <= count)
        .map_or(DEFAULT_RATE, |tier| tier.rate)
}

/// Amounts are in tenths of a display unit.
pub fn calc_order_amount(unit_price: i64, tiers: &[DiscountTier], period: BillingPeriod) -> AppResult<OrderAmount> {
    if unit_price < 0 {
        return Err(AppError::malformed(format!("negative unit price {unit_price}")));
    }
    let count = period.days();
    let rate = select_rate(tiers, count);
    let total_amount = count as i64 * unit_price;
    let amount = total_amount * rate as i64 / 100;
    let discount = total_amount - amount;

    let months = count / 30;
    let display = amount as f64 / 10.0;
    let human_text = if months >= 12 {
        format!("购买{:.1}年共计{:.2}元", months as f64 / 12.0, display)
    } else {
        format!("购买{}个月共计{:.2}元", months, display)
    };
    let discount_text = if discount > 0 {
        format!("已优惠{:.2}元", discount as f64 / 10.0)
    } else {
        String::new()
    };

    Ok(OrderAmount {
        count,
        total_amount,
        amount,
        discount,
        discount_text,
        human_text,
    })
}
