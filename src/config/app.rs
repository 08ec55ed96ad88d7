use anyhow::Result;
use std::env;

/// Process-wide settings, read once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub default_avatar_url: String,
    pub sensitive_words: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string());
        let token_ttl_hours = env::var("TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "48".to_string())
            .parse()
            .unwrap_or(48);
        let bcrypt_cost = env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);
        let default_avatar_url = env::var("DEFAULT_AVATAR_URL")
            .unwrap_or_else(|_| "https://static.fithub.top/avatars/default.png".to_string());
        let sensitive_words = env::var("SENSITIVE_WORDS")
            .map(|raw| parse_word_list(&raw))
            .unwrap_or_default();

        if environment == "production" && jwt_secret.starts_with("your-secret-key") {
            anyhow::bail!("JWT_SECRET must be set in production");
        }

        Ok(AppConfig {
            host,
            port,
            environment,
            log_level,
            jwt_secret,
            token_ttl_hours,
            bcrypt_cost,
            default_avatar_url,
            sensitive_words,
        })
    }

    /// Settings for tests and tooling; cheap bcrypt cost.
    pub fn for_testing(jwt_secret: &str) -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            jwt_secret: jwt_secret.to_string(),
            token_ttl_hours: 48,
            bcrypt_cost: 4,
            default_avatar_url: "https://static.fithub.top/avatars/default.png".to_string(),
            sensitive_words: vec!["badword".to_string()],
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_word_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
