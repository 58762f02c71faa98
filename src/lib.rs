//! Powerwatch - per-device power anomaly detection and forecasting
//!
//! Readings arrive on a message stream, are appended to a bounded
//! per-device window and classified by [`detector::AnomalyDetector`].
//! Anomalies go to a notification channel and an append-only store.
//! Forecasts are produced on demand from hourly history by
//! [`forecast::ForecastEngine`].

pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod forecast;
pub mod service;
pub mod sinks;
pub mod stats;
pub mod stream;
pub mod types;
pub mod window;

pub use config::{CoordinatorConfig, ServiceConfig};
pub use coordinator::{CoordinatorState, CoordinatorStats, Sinks, StreamCoordinator};
pub use detector::{AnomalyDetector, DetectorThresholds};
pub use error::{ConfigError, ForecastError, IngestError, SinkError, StreamError};
pub use forecast::{ForecastEngine, MODEL_VERSION};
pub use service::MlService;
pub use types::{AnomalyNotification, AnomalyResult, AnomalyType, ForecastPoint, HourlyAverage, Reading, Severity};
pub use window::{EvictionPolicy, WindowStore};
