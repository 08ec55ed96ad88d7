use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::subscription::{Subscription, MAX_SUBSCRIPTION_DAYS};
use crate::error::{AppError, AppResult};

int_enum! {
    pub enum GiftCardStatus {
        Unused = 0,
        Used = 1,
        Expired = 2,
        Invalid = 3,
    }
}

/// Unambiguous alphabet: no I, O, 0 or 1.
pub const GIFT_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const GIFT_CODE_LEN: usize = 8;

pub fn generate_gift_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..GIFT_CODE_LEN)
        .map(|_| GIFT_CODE_ALPHABET[rng.gen_range(0..GIFT_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are compared upper-case with surrounding whitespace removed.
pub fn canonical_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, FromRow)]
pub struct GiftCard {
    pub id: i64,
    pub code: String,
    pub status: GiftCardStatus,
    pub reward_id: i64,
    pub consumer_id: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
}

impl GiftCard {
    pub fn ensure_redeemable(&self) -> AppResult<()> {
        match self.status {
            GiftCardStatus::Unused => Ok(()),
            GiftCardStatus::Used => Err(AppError::conflict("gift card already used")),
            GiftCardStatus::Expired => Err(AppError::invalid_state("gift card has expired")),
            GiftCardStatus::Invalid => Err(AppError::invalid_state("gift card is invalid")),
        }
    }
}

/// Reward payload stored in `gift_card_reward.details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDetails {
    #[serde(default)]
    pub subscription_plan_id: i64,
    #[serde(default)]
    pub day_count: i32,
}

impl RewardDetails {
    pub const VERSION: i64 = 1;

    pub fn parse(raw: &str) -> AppResult<Self> {
        let details: RewardDetails = serde_json::from_str(raw)
            .map_err(|e| AppError::malformed(format!("gift card reward: {e}")))?;
        if !details.is_valid() {
            return Err(AppError::malformed(format!(
                "gift card reward requires subscription_plan_id and a day_count in 1..={MAX_SUBSCRIPTION_DAYS}, got {raw}"
            )));
        }
        Ok(details)
    }

    pub fn is_valid(&self) -> bool {
        self.subscription_plan_id > 0 && (1..=MAX_SUBSCRIPTION_DAYS).contains(&self.day_count)
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "v": Self::VERSION,
            "subscription_plan_id": self.subscription_plan_id,
            "day_count": self.day_count,
        })
        .to_string()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RedeemGiftCardRequest {
    #[validate(length(min = 1, max = 32, message = "code is required"))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedeemResponse {
    pub subscription: Subscription,
}
