//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HS256 secret for issuing and verifying player tokens
    pub jwt_secret: String,
    /// Lifetime of issued tokens
    pub token_ttl: Duration,

    /// Allowed client origins for CORS, comma-separated
    pub client_origin: String,

    /// Safety-net interval of the matchmaking scanner
    pub match_scan_interval: Duration,
    /// Max inbound websocket messages per second per connection
    pub input_rate_limit: u32,
    /// Rooms nobody joined are removed after this long
    pub room_idle_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            jwt_secret,
            token_ttl: Duration::from_secs(parse_or("TOKEN_TTL_SECS", 86_400)?),

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            match_scan_interval: Duration::from_millis(parse_or("MATCH_SCAN_INTERVAL_MS", 100)?),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 20)?,
            room_idle_ttl: Duration::from_secs(parse_or("ROOM_IDLE_TTL_SECS", 300)?),
        })
    }

    /// Allowed CORS origins
    pub fn client_origins(&self) -> Vec<String> {
        self.client_origin
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Read a numeric variable, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid number in environment variable: {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
impl Config {
    /// Configuration for tests, independent of the process environment
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl: Duration::from_secs(3600),
            client_origin: "http://localhost:5173, http://localhost:3000".to_string(),
            match_scan_interval: Duration::from_millis(100),
            input_rate_limit: 20,
            room_idle_ttl: Duration::from_secs(300),
        }
    }
}
