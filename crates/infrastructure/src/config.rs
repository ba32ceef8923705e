//! Environment-driven sensor configuration.
//!
//! Everything the sensor needs at startup comes from the process
//! environment; the arbiter-reloadable subset (alert threshold, subsystem
//! flags) is synced at runtime and lives elsewhere.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingRequired(&'static str),

    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Static sensor configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub debug: bool,
    /// Sensor identity, sent as `X_SENSOR_NAME` on every request.
    pub sensor_name: String,
    /// Shared secret, sent as `X_AUTH_KEY` on every request.
    pub auth_secret: String,
    pub heartbeat_identifier: String,
    pub heartbeat_url: String,
    /// HTTP base URL of the arbiter.
    pub arbiter_url: String,
    /// Host (no scheme) for the arbiter's WebSocket endpoint.
    pub arbiter_host: String,
    /// Disables TLS verification and downgrades wss to ws.
    pub insecure_skip_verify_tls: bool,
    pub store_path: PathBuf,
    pub ip_score_cache_size: usize,
    pub recommendations_cache_size: usize,
    pub log_to_remote: bool,
    pub remote_log_address: String,
    pub syslog_listen_addr: String,
    pub syslog_port: u16,
    pub ws_keepalive_period: Duration,
}

impl SensorConfig {
    /// Load from the process environment. Missing `SENSOR_NAME` or
    /// `AUTH_SECRET` is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an injected lookup, so tests never touch the global
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(ConfigError::MissingRequired(key)),
            }
        };
        let or_default =
            |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());

        Ok(Self {
            debug: parse_bool(&lookup, "DEBUG", false)?,
            sensor_name: required("SENSOR_NAME")?,
            auth_secret: required("AUTH_SECRET")?,
            heartbeat_identifier: or_default("HEARTBEAT_IDENTIFIER", ""),
            heartbeat_url: or_default("HEARTBEAT_URL", "https://heartbeat.example.com"),
            arbiter_url: or_default("ARBITER_URL", "https://arbiter.example.com"),
            arbiter_host: or_default("ARBITER_HOST", "arbiter.example.com"),
            insecure_skip_verify_tls: parse_bool(&lookup, "INSECURE_SKIP_VERIFY_TLS", false)?,
            store_path: PathBuf::from(or_default("STORE_PATH", "/data/ip_scores.redb")),
            ip_score_cache_size: parse_number(&lookup, "IP_SCORE_CACHE_SIZE", 1000)?,
            recommendations_cache_size: parse_number(&lookup, "RECOMMENDATIONS_CACHE_SIZE", 100)?,
            log_to_remote: parse_bool(&lookup, "LOG_TO_REMOTE", false)?,
            remote_log_address: or_default("REMOTE_LOG_ADDRESS", ""),
            syslog_listen_addr: or_default("SYSLOG_LISTEN_ADDR", "0.0.0.0"),
            syslog_port: parse_number(&lookup, "SYSLOG_PORT", 514)?,
            ws_keepalive_period: Duration::from_secs(30),
        })
    }

    /// Copy with the auth secret masked, safe to log at startup.
    pub fn sanitized(&self) -> Self {
        let mut sanitized = self.clone();
        sanitized.auth_secret = "***".to_string();
        sanitized
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str, fallback: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(fallback),
        Some(value) => value
            .parse::<bool>()
            .map_err(|_| ConfigError::InvalidValue {
                variable: key,
                value,
                reason: "expected 'true' or 'false'".to_string(),
            }),
    }
}

fn parse_number<F, N>(lookup: &F, key: &'static str, fallback: N) -> Result<N, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    N: std::str::FromStr,
    N::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(fallback),
        Some(value) => value.parse::<N>().map_err(|e| ConfigError::InvalidValue {
            variable: key,
            value,
            reason: e.to_string(),
        }),
    }
}
