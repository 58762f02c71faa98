//! Service configuration from environment variables
//!
//! Unset variables fall back to defaults; set-but-invalid values are
//! rejected rather than silently replaced.

use crate::error::ConfigError;
use crate::sinks::redis_pubsub::DEFAULT_ANOMALY_CHANNEL;
use crate::stream::DEFAULT_READINGS_STREAM;
use crate::window::{EvictionPolicy, DEFAULT_MAX_DEVICES, DEFAULT_WINDOW_CAPACITY, MAX_WINDOW_CAPACITY};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DEVICE_IDLE_TTL_SECS: u64 = 24 * 60 * 60;
/// Upper bound on messages per stream read
pub const MAX_BATCH_SIZE: usize = 10;

/// Stream loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Max messages per read, at most `MAX_BATCH_SIZE`
    pub batch_size: usize,
    /// Upper bound on a single blocking read
    pub block_timeout_ms: u64,
    /// Fixed pause after a failed batch
    pub backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            block_timeout_ms: 1_000,
            backoff_ms: 1_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub db_path: String,
    pub redis_url: String,
    pub readings_stream: String,
    pub anomaly_channel: String,
    pub coordinator: CoordinatorConfig,
    pub window_capacity: usize,
    pub max_tracked_devices: usize,
    /// 0 disables idle eviction
    pub device_idle_ttl_secs: u64,
    /// Persist every inbound reading (feeds forecast history)
    pub record_readings: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: "powerwatch.db".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            readings_stream: DEFAULT_READINGS_STREAM.to_string(),
            anomaly_channel: DEFAULT_ANOMALY_CHANNEL.to_string(),
            coordinator: CoordinatorConfig::default(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            max_tracked_devices: DEFAULT_MAX_DEVICES,
            device_idle_ttl_secs: DEFAULT_DEVICE_IDLE_TTL_SECS,
            record_readings: true,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `POWERWATCH_DB_PATH` (default: powerwatch.db)
    /// - `REDIS_URL` (default: redis://localhost:6379)
    /// - `READINGS_STREAM_KEY` (default: ml:readings)
    /// - `ANOMALY_CHANNEL` (default: anomalies)
    /// - `STREAM_BATCH_SIZE` (default: 10)
    /// - `STREAM_BLOCK_TIMEOUT_MS` (default: 1000)
    /// - `STREAM_BACKOFF_MS` (default: 1000)
    /// - `WINDOW_CAPACITY` (default: 100)
    /// - `MAX_TRACKED_DEVICES` (default: 10000)
    /// - `DEVICE_IDLE_TTL_SECS` (default: 86400, 0 disables)
    /// - `RECORD_READINGS` (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let string_var = |key: &str, default: String| lookup(key).unwrap_or(default);

        let coordinator = CoordinatorConfig {
            batch_size: parse_var(&lookup, "STREAM_BATCH_SIZE", defaults.coordinator.batch_size)?,
            block_timeout_ms: parse_var(&lookup, "STREAM_BLOCK_TIMEOUT_MS", defaults.coordinator.block_timeout_ms)?,
            backoff_ms: parse_var(&lookup, "STREAM_BACKOFF_MS", defaults.coordinator.backoff_ms)?,
        };

        let config = Self {
            db_path: string_var("POWERWATCH_DB_PATH", defaults.db_path),
            redis_url: string_var("REDIS_URL", defaults.redis_url),
            readings_stream: string_var("READINGS_STREAM_KEY", defaults.readings_stream),
            anomaly_channel: string_var("ANOMALY_CHANNEL", defaults.anomaly_channel),
            coordinator,
            window_capacity: parse_var(&lookup, "WINDOW_CAPACITY", defaults.window_capacity)?,
            max_tracked_devices: parse_var(&lookup, "MAX_TRACKED_DEVICES", defaults.max_tracked_devices)?,
            device_idle_ttl_secs: parse_var(&lookup, "DEVICE_IDLE_TTL_SECS", defaults.device_idle_ttl_secs)?,
            record_readings: parse_bool(&lookup, "RECORD_READINGS", defaults.record_readings)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let bounded = [
            ("STREAM_BATCH_SIZE", self.coordinator.batch_size, MAX_BATCH_SIZE),
            ("WINDOW_CAPACITY", self.window_capacity, MAX_WINDOW_CAPACITY),
            ("MAX_TRACKED_DEVICES", self.max_tracked_devices, usize::MAX),
        ];
        for (key, value, max) in bounded {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
            if value > max {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: format!("{} exceeds the maximum of {}", value, max),
                });
            }
        }
        Ok(())
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            max_devices: self.max_tracked_devices,
            idle_ttl: match self.device_idle_ttl_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: format!("`{}`: {}", raw, e),
        }),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match lookup(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                reason: format!("`{}` is not a boolean", raw),
            }),
        },
    }
}
