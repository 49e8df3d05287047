//! Environment-driven service configuration.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("Invalid value '{value}' for {name}")]
    InvalidVar { name: &'static str, value: String },
}

/// Runtime configuration, resolved from environment variables with CLI
/// overrides applied on top.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram Bot API token. Required.
    pub telegram_token: String,
    /// Chat allowed to run admin commands. Unset disables them.
    pub admin_chat_id: Option<i64>,
    /// Scheduler tick period.
    pub check_interval: Duration,
    /// SQLite database file path.
    pub db_path: String,
    /// Log level name.
    pub log_level: String,
    /// Price quote cache TTL.
    pub cache_duration: Duration,
    /// Upstream HTTP timeout.
    pub api_timeout: Duration,
    /// Maximum active subscriptions per chat.
    pub max_subscriptions_per_user: i64,
    /// Inclusive threshold bounds.
    pub max_price_threshold: f64,
    pub min_price_threshold: f64,
    /// Port for the HTTP health probe.
    pub health_port: u16,
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name,
        value: value.to_string(),
    })
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse_var(name, &value),
        Err(_) => Ok(default),
    }
}

/// A zero interval would stall the scheduler, so it is a config error.
pub fn non_zero_secs(name: &'static str, secs: u64) -> Result<u64, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidVar {
            name,
            value: "0".to_string(),
        });
    }
    Ok(secs)
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_token =
            std::env::var("TELEGRAM_TOKEN").map_err(|_| ConfigError::MissingVar("TELEGRAM_TOKEN"))?;

        let admin_chat_id = match std::env::var("ADMIN_CHAT_ID") {
            Ok(value) => Some(parse_var("ADMIN_CHAT_ID", &value)?),
            Err(_) => None,
        };

        Ok(Self {
            telegram_token,
            admin_chat_id,
            check_interval: Duration::from_secs(non_zero_secs(
                "CHECK_INTERVAL",
                env_or("CHECK_INTERVAL", 300u64)?,
            )?),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "subs.db".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            cache_duration: Duration::from_secs(env_or("CACHE_DURATION", 60u64)?),
            api_timeout: Duration::from_secs(env_or("API_TIMEOUT", 10u64)?),
            max_subscriptions_per_user: env_or("MAX_SUBSCRIPTIONS_PER_USER", 10i64)?,
            max_price_threshold: env_or("MAX_PRICE_THRESHOLD", 1_000_000.0f64)?,
            min_price_threshold: env_or("MIN_PRICE_THRESHOLD", 0.000001f64)?,
            health_port: env_or("HEALTH_PORT", 8080u16)?,
        })
    }

    /// Connection URL for the SQLite store.
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            self.db_path.clone()
        } else {
            format!("sqlite://{}", self.db_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_with_db(db_path: &str) -> Config {
        Config {
            telegram_token: "token".to_string(),
            admin_chat_id: None,
            check_interval: Duration::from_secs(300),
            db_path: db_path.to_string(),
            log_level: "info".to_string(),
            cache_duration: Duration::from_secs(60),
            api_timeout: Duration::from_secs(10),
            max_subscriptions_per_user: 10,
            max_price_threshold: 1_000_000.0,
            min_price_threshold: 0.000001,
            health_port: 8080,
        }
    }

    #[test]
    fn test_database_url_adds_scheme() {
        assert_eq!(config_with_db("subs.db").database_url(), "sqlite://subs.db");
        assert_eq!(
            config_with_db("sqlite::memory:").database_url(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            non_zero_secs("CHECK_INTERVAL", 0),
            Err(ConfigError::InvalidVar {
                name: "CHECK_INTERVAL",
                ..
            })
        ));
        assert_eq!(non_zero_secs("CHECK_INTERVAL", 300).unwrap(), 300);
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var::<u64>("X", "300").unwrap(), 300);
        assert_eq!(parse_var::<u64>("X", " 300 ").unwrap(), 300);
        assert!(matches!(
            parse_var::<u64>("X", "abc"),
            Err(ConfigError::InvalidVar { name: "X", .. })
        ));
    }
}
