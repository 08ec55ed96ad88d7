use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::pagination::Identified;
use super::subscription::SubscriptionSummary;
use crate::error::{AppError, AppResult};

pub const PROVIDER_EMAIL_PASSWORD: &str = "email+password";

const NICKNAME_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const NICKNAME_LEN: usize = 6;

int_enum! {
    pub enum RelationshipStatus {
        Pending = 1,
        Confirmed = 2,
        Rejected = 3,
        Dismissed = 4,
    }
}

int_enum! {
    pub enum RelationshipRole {
        CoachStudent = 1,
        Partner = 2,
    }
}

/// Which end of a relationship edge the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipSide {
    Coach,
    Student,
}

impl RelationshipStatus {
    /// Students answer pending invitations; coaches may dismiss at any time.
    pub fn transition(self, side: RelationshipSide, to: RelationshipStatus) -> AppResult<RelationshipStatus> {
        use RelationshipStatus::*;

        match (side, self, to) {
            (RelationshipSide::Student, Pending, Confirmed | Rejected) => Ok(to),
            (RelationshipSide::Coach, Pending | Confirmed | Rejected, Dismissed) => Ok(to),
            (_, Dismissed, _) => Err(AppError::invalid_state("relationship was dismissed")),
            _ => Err(AppError::invalid_state(format!(
                "cannot move relationship from {:?} to {:?}",
                self, to
            ))),
        }
    }
}

pub fn random_nickname<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..NICKNAME_LEN)
        .map(|_| NICKNAME_ALPHABET[rng.gen_range(0..NICKNAME_ALPHABET.len())] as char)
        .collect()
}

/// Resolves a client-supplied avatar against the configured default.
///
/// Empty values fall back to the default; absolute URLs are kept; anything
/// else is treated as a path on the default avatar's host.
pub fn normalize_avatar_url(default_url: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return default_url.to_string();
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }

    let origin = match default_url.find("://") {
        Some(scheme_end) => {
            let host_start = scheme_end + 3;
            match default_url[host_start..].find('/') {
                Some(path_start) => &default_url[..host_start + path_start],
                None => default_url,
            }
        }
        None => "",
    };
    format!("{}/{}", origin, value.trim_start_matches('/'))
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Coach {
    pub id: i64,
    pub nickname: String,
    pub avatar_url: String,
    pub bio: String,
    pub profile1_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CoachAccount {
    pub id: i64,
    pub coach_id: i64,
    pub provider_arg1: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CoachProfile1 {
    pub id: i64,
    pub coach_id: i64,
    pub avatar_url: String,
    pub gender: i16,
    pub height: f64,
    pub weight: f64,
    pub birthday: Option<NaiveDate>,
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CoachRelationship {
    pub id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub status: RelationshipStatus,
    pub role: RelationshipRole,
    pub created_at: DateTime<Utc>,
}

impl CoachRelationship {
    pub fn side_of(&self, caller: i64) -> Option<RelationshipSide> {
        if caller == self.coach_id {
            Some(RelationshipSide::Coach)
        } else if caller == self.student_id {
            Some(RelationshipSide::Student)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentListItem {
    pub id: i64,
    pub student_id: i64,
    pub nickname: String,
    pub avatar_url: String,
    pub status: RelationshipStatus,
    pub role: RelationshipRole,
    pub created_at: DateTime<Utc>,
}

impl Identified for StudentListItem {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub coach: Coach,
    pub profile: CoachProfile1,
    pub subscription: Option<SubscriptionSummary>,
}

/// Partial update of the coach row and its body profile.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    #[validate(length(max = 512))]
    pub bio: Option<String>,
    #[validate(range(min = 0, max = 2))]
    pub gender: Option<i16>,
    #[validate(range(min = 0.0, max = 300.0))]
    pub height: Option<f64>,
    #[validate(range(min = 0.0, max = 500.0))]
    pub weight: Option<f64>,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 512))]
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 64, message = "nickname is required"))]
    pub nickname: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 2))]
    pub gender: i16,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub weight: f64,
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub goal: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStudent {
    pub student_id: i64,
    pub relationship_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRelationshipRequest {
    pub relationship_id: i64,
    pub status: RelationshipStatus,
}
