use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub status_endpoint: StatusEndpointConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

/// External endpoint that receives client connect/disconnect reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEndpointConfig {
    pub url: String,
    pub method: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Upper bound for any request/acknowledge exchange with a client
    pub request_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub max_frame_size: usize,
}

impl WebSocketConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
            max_frame_size: 256_000,
        }
    }
}

impl StatusEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| AppError::Config(format!("{key}: {e}")))
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let method = env_or("STATUS_ENDPOINT_METHOD", "POST").to_uppercase();
        if reqwest::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(AppError::Config(format!(
                "STATUS_ENDPOINT_METHOD: invalid HTTP method {method}"
            )));
        }

        Ok(Config {
            app: AppConfig {
                env: env_or("APP_ENV", "development"),
                host: env_or("APP_HOST", "0.0.0.0"),
                port: parse_env("APP_PORT", "8000")?,
            },
            status_endpoint: StatusEndpointConfig {
                url: env_or("STATUS_ENDPOINT_URL", "http://localhost:9000/client-status"),
                method,
                timeout_secs: parse_env("STATUS_ENDPOINT_TIMEOUT_SECS", "10")?,
            },
            websocket: WebSocketConfig {
                request_timeout_secs: parse_env("PEER_REQUEST_TIMEOUT_SECS", "30")?,
                heartbeat_interval_secs: parse_env("WS_HEARTBEAT_INTERVAL_SECS", "5")?,
                client_timeout_secs: parse_env("WS_CLIENT_TIMEOUT_SECS", "30")?,
                max_frame_size: parse_env("WS_MAX_FRAME_SIZE", "256000")?,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}
