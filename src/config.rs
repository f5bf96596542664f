use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub ws_url: String,
    pub log_level: String,
    pub http_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
    pub event_buffer_size: usize,
    pub notification_buffer_size: usize,
    pub cache_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            ws_url: env::var("WS_URL")
                .unwrap_or_else(|_| "ws://localhost:8080/ws/orders".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            http_timeout_secs: parse_or_default("HTTP_TIMEOUT_SECS", 10)?,
            reconnect_delay_secs: parse_or_default("RECONNECT_DELAY_SECS", 5)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notification_buffer_size: parse_or_default("NOTIFICATION_BUFFER_SIZE", 64)?,
            cache_path: PathBuf::from(
                env::var("CACHE_PATH").unwrap_or_else(|_| "rider-cache.json".to_string()),
            ),
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
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
            .map_err(|err| AppError::Config(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
