use dotenvy::dotenv;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url:     String,

    // Backend
    pub backend_host:     String,
    pub backend_port:     u16,
    pub static_dir:       String,

    // Sessions
    pub session_days:            i64,
    pub profile_cache_ttl_secs:  i64,
    pub session_sweep_minutes:   u64,

    // Payments
    pub stripe_secret_key:             String,
    pub stripe_webhook_secret:         String,
    pub stripe_api_base:               String,
    pub stripe_webhook_tolerance_secs: i64,

    // App
    pub app_env:          String,
    pub app_base_url:     String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn require(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

/// Absent → `default`; present but unparsable → `InvalidValue`.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => format!(
                "postgres://{}:{}@{}:{}/{}",
                require("DB_USER")?,
                urlencoding::encode(&require("DB_PASSWORD")?),
                env::var("DB_HOST").unwrap_or_else(|_| "db".into()),
                parse_or::<u16>("DB_PORT", 5432)?,
                require("DB_NAME")?,
            ),
        };

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        if app_env != "development" {
            if stripe_secret_key.is_empty() {
                return Err(ConfigError::MissingVar("STRIPE_SECRET_KEY".into()));
            }
            if stripe_webhook_secret.is_empty() {
                return Err(ConfigError::MissingVar("STRIPE_WEBHOOK_SECRET".into()));
            }
        }

        Ok(Self {
            database_url,

            backend_host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            backend_port: parse_or("BACKEND_PORT", 8080)?,
            static_dir:   env::var("STATIC_DIR").unwrap_or_else(|_| "frontend/dist".into()),

            session_days:           parse_or("SESSION_DAYS", 30)?,
            profile_cache_ttl_secs: parse_or("PROFILE_CACHE_TTL_SECS", 180)?,
            session_sweep_minutes:  parse_or("SESSION_SWEEP_INTERVAL_MINUTES", 30)?,

            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| crate::payments::stripe::DEFAULT_API_BASE.into()),
            stripe_webhook_tolerance_secs: parse_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,

            app_env,
            app_base_url: env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into()),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url:                  String::new(),
            backend_host:                  "127.0.0.1".into(),
            backend_port:                  0,
            static_dir:                    "does-not-exist".into(),
            session_days:                  30,
            profile_cache_ttl_secs:        180,
            session_sweep_minutes:         0,
            stripe_secret_key:             String::new(),
            stripe_webhook_secret:         "whsec_test".into(),
            stripe_api_base:               "http://127.0.0.1:9".into(),
            stripe_webhook_tolerance_secs: 300,
            app_env:                       "test".into(),
            app_base_url:                  "https://concierge.test".into(),
        }
    }
}
