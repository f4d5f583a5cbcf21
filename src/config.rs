use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub heartbeat_secs: u64,
    pub event_inbox_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "delivery-dispatch".to_string()),
            heartbeat_secs: parse_or_default("SSE_HEARTBEAT_SECS", 25)?,
            event_inbox_size: parse_or_default("EVENT_INBOX_SIZE", 256)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            jwt_secret: "dev-secret-change-me".to_string(),
            jwt_issuer: "delivery-dispatch".to_string(),
            heartbeat_secs: 25,
            event_inbox_size: 256,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
