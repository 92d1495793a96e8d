// Runtime configuration read from the environment.
//
// Every variable has a default. A variable that is set but cannot be parsed is an error.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::shared::infrastructure::retry::RetryPolicy;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub default_calendar_id: String,
    pub calendar_ids: Vec<String>,
    pub cache_ttl: Duration,
    pub sync_retry: RetryPolicy,
}

fn parse<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
            key,
            reason: error.to_string(),
            value,
        }),
    }
}

impl AppConfig {
    /// Reads the process environment after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse(
            "BIND_ADDR",
            lookup("BIND_ADDR"),
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        let default_calendar_id = lookup("DEFAULT_CALENDAR_ID")
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| "primary".to_string());
        if default_calendar_id.is_empty() {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_CALENDAR_ID",
                value: default_calendar_id,
                reason: "must not be empty".into(),
            });
        }

        let calendar_ids: Vec<String> = lookup("CALENDAR_IDS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let calendar_ids = if calendar_ids.is_empty() {
            vec![default_calendar_id.clone()]
        } else {
            calendar_ids
        };

        let cache_ttl_seconds: u64 = parse("CACHE_TTL_SECONDS", lookup("CACHE_TTL_SECONDS"), 300)?;
        let max_attempts: u32 = parse("SYNC_MAX_ATTEMPTS", lookup("SYNC_MAX_ATTEMPTS"), 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "SYNC_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "at least one attempt is needed".into(),
            });
        }
        let backoff_ms: u64 = parse("SYNC_BACKOFF_MS", lookup("SYNC_BACKOFF_MS"), 200)?;

        Ok(Self {
            bind_addr,
            default_calendar_id,
            calendar_ids,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            sync_retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(backoff_ms)),
        })
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[rstest]
    fn it_should_fall_back_to_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.calendar_ids, vec!["primary".to_string()]);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.sync_retry.max_attempts, 3);
        assert_eq!(config.sync_retry.backoff[0], Duration::from_millis(200));
    }

    #[rstest]
    fn it_should_split_calendar_ids() {
        let config = config(&[("CALENDAR_IDS", "main, youth ,,")]).unwrap();
        assert_eq!(config.calendar_ids, vec!["main".to_string(), "youth".to_string()]);
    }

    #[rstest]
    #[case("CACHE_TTL_SECONDS", "soon")]
    #[case("SYNC_MAX_ATTEMPTS", "0")]
    #[case("BIND_ADDR", "localhost")]
    fn it_should_reject_invalid_values(#[case] key: &str, #[case] value: &str) {
        assert!(matches!(
            config(&[(key, value)]),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
