//! Collaborator interfaces the core writes to and reads from
//!
//! - `AnomalyNotifier` - publish/subscribe channel for live anomaly alerts
//! - `AnomalyStore` - append-only anomaly records keyed by (device_id, time)
//! - `ForecastStore` - append-only forecast records keyed by (device_id, forecast_time)
//! - `HistorySource` - hourly aggregates feeding the forecaster
//! - `ReadingStore` - raw readings, the data `HistorySource` aggregates
//!
//! `SqliteStore` implements every storage trait; `RedisNotifier`,
//! `ChannelNotifier` and `LogNotifier` implement the notifier.

pub mod memory;
pub mod redis_pubsub;
pub mod sqlite;

use crate::error::SinkError;
use crate::types::{AnomalyNotification, AnomalyResult, ForecastPoint, HourlyAverage, Reading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::memory::{ChannelNotifier, LogNotifier};
pub use self::redis_pubsub::RedisNotifier;
pub use self::sqlite::SqliteStore;

#[async_trait]
pub trait AnomalyNotifier: Send + Sync {
    async fn publish(&self, notification: &AnomalyNotification) -> Result<(), SinkError>;

    /// Sink name for logging
    fn sink_type(&self) -> &'static str;
}

#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Append an anomaly, keeping the raw reading as metadata
    async fn write_anomaly(&self, reading: &Reading, anomaly: &AnomalyResult) -> Result<(), SinkError>;
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    async fn write_forecasts(
        &self,
        device_id: &str,
        points: &[ForecastPoint],
        model_version: &str,
    ) -> Result<(), SinkError>;
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Hourly average power after `since`, ordered by hour ascending
    async fn hourly_history(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAverage>, SinkError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn write_reading(&self, reading: &Reading) -> Result<(), SinkError>;
}
