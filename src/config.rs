use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub backend_url: Option<String>,
    pub backend_token: Option<String>,
    pub backend_timeout_secs: u64,
    pub event_buffer_size: usize,
    pub tracking: TrackingSettings,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackingSettings {
    pub interval: Duration,
    /// Minimum movement before a new position is worth reporting.
    pub min_distance_m: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            min_distance_m: 10.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            backend_url: None,
            backend_token: None,
            backend_timeout_secs: 10,
            event_buffer_size: 1024,
            tracking: TrackingSettings::default(),
            poll_interval_ms: 5_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracking_interval_ms: u64 = parse_or_default(&lookup, "TRACKING_INTERVAL_MS", 5_000)?;
        let poll_interval_ms: u64 = parse_or_default(&lookup, "POLL_INTERVAL_MS", 5_000)?;

        if tracking_interval_ms == 0 || poll_interval_ms == 0 {
            return Err(AppError::Internal(
                "TRACKING_INTERVAL_MS and POLL_INTERVAL_MS must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", 3000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parse_or_default(&lookup, "LOG_JSON", false)?,
            backend_url: non_empty(lookup("BACKEND_URL")),
            backend_token: non_empty(lookup("BACKEND_TOKEN")),
            backend_timeout_secs: parse_or_default(&lookup, "BACKEND_TIMEOUT_SECS", 10)?,
            event_buffer_size: parse_or_default(&lookup, "EVENT_BUFFER_SIZE", 1024)?,
            tracking: TrackingSettings {
                interval: Duration::from_millis(tracking_interval_ms),
                min_distance_m: parse_or_default(&lookup, "TRACKING_MIN_DISTANCE_M", 10.0)?,
            },
            poll_interval_ms,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::Config;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, crate::error::AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert!(config.backend_url.is_none());
        assert_eq!(config.tracking.interval, Duration::from_millis(5_000));
        assert_eq!(config.poll_interval_ms, 5_000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("HTTP_PORT", "8081"),
            ("BACKEND_URL", "https://api.example.test"),
            ("TRACKING_MIN_DISTANCE_M", "25.5"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();

        assert_eq!(config.http_port, 8081);
        assert_eq!(config.backend_url.as_deref(), Some("https://api.example.test"));
        assert_eq!(config.tracking.min_distance_m, 25.5);
        assert!(config.log_json);
    }

    #[test]
    fn blank_backend_url_means_offline() {
        let config = config_from(&[("BACKEND_URL", "  ")]).unwrap();
        assert!(config.backend_url.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("HTTP_PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("POLL_INTERVAL_MS", "0")]).is_err());
    }
}
