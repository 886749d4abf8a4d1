// config.rs
use thiserror::Error;

use crate::{db::cache::GIG_STATUS_CACHE_TTL, service::completion_machine::CompletionPolicy};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{key} has invalid value '{value}': {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it gigs live in process memory.
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub port: u16,
    pub initiator_confirms: bool,
    pub confirmation_reminder_hours: i64,
    pub escrow_reconcile_interval_secs: u64,
    pub status_cache_ttl_secs: usize,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn init() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL");
        let redis_url = get("REDIS_URL");

        let port = parse_or("PORT", get("PORT"), 8000u16, "expected a port number")?;
        let initiator_confirms = match get("INITIATOR_CONFIRMS") {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError {
                        key: "INITIATOR_CONFIRMS",
                        value: raw,
                        reason: "expected true or false",
                    })
                }
            },
        };

        let confirmation_reminder_hours = parse_or(
            "CONFIRMATION_REMINDER_HOURS",
            get("CONFIRMATION_REMINDER_HOURS"),
            72i64,
            "expected a whole number of hours",
        )?;
        if confirmation_reminder_hours <= 0 {
            return Err(ConfigError {
                key: "CONFIRMATION_REMINDER_HOURS",
                value: confirmation_reminder_hours.to_string(),
                reason: "must be positive",
            });
        }

        let escrow_reconcile_interval_secs = parse_or(
            "ESCROW_RECONCILE_INTERVAL_SECS",
            get("ESCROW_RECONCILE_INTERVAL_SECS"),
            300u64,
            "expected a whole number of seconds",
        )?;
        if escrow_reconcile_interval_secs == 0 {
            return Err(ConfigError {
                key: "ESCROW_RECONCILE_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }

        let status_cache_ttl_secs = parse_or(
            "STATUS_CACHE_TTL_SECS",
            get("STATUS_CACHE_TTL_SECS"),
            GIG_STATUS_CACHE_TTL,
            "expected a whole number of seconds",
        )?;
        if status_cache_ttl_secs == 0 {
            return Err(ConfigError {
                key: "STATUS_CACHE_TTL_SECS",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            redis_url,
            port,
            initiator_confirms,
            confirmation_reminder_hours,
            escrow_reconcile_interval_secs,
            status_cache_ttl_secs,
            allowed_origins,
        })
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            initiator_confirms: self.initiator_confirms,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError {
            key,
            value,
            reason,
        }),
    }
}
