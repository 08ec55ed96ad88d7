use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::{AuthError, Claims, CoachSession};

pub const TOKEN_ISSUER: &str = "top.fithub";

/// HS256 token service bound to one coach id per token.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl JwtService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issues a token for `coach_id`, returning it with its expiry.
    pub fn create_token(&self, coach_id: i64, now: DateTime<Utc>) -> Result<(String, i64), AuthError> {
        let expires_at = (now + self.token_ttl).timestamp();
        let claims = Claims {
            id: coach_id,
            expires_at,
            issuer: TOKEN_ISSUER.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok((token, expires_at))
    }

    /// Verifies signature, issuer and expiry. The payload carries its own
    /// `expires_at` rather than the registered `exp` claim.
    pub fn validate_token(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)?;

        if claims.issuer != TOKEN_ISSUER || claims.id <= 0 {
            return Err(AuthError::InvalidToken);
        }
        if claims.expires_at <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    pub fn extract_session(&self, token: &str, now: DateTime<Utc>) -> Result<CoachSession, AuthError> {
        let claims = self.validate_token(token, now)?;
        Ok(CoachSession { coach_id: claims.id })
    }
}

/// Extract bearer token from authorization header
pub fn extract_bearer_token(auth_header: &str) -> Result<&str, AuthError> {
    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::InvalidAuthHeaderFormat),
    }
}
