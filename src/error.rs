//! Error types shared across the service
//!
//! Malformed input and short forecast history are client-visible rejections;
//! sink and stream failures are infrastructure errors that the coordinator
//! logs and backs off on.

use thiserror::Error;

/// Rejection of an inbound reading before it reaches the detector
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed reading payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid reading field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unparseable timestamp `{0}`")]
    InvalidTimestamp(String),
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient historical data for forecasting: {found} hourly points, need {required}")]
    InsufficientHistory { found: usize, required: usize },

    #[error("forecast horizon must be between 1 and 168 hours")]
    InvalidHorizon,

    #[error("failed to load history: {0}")]
    History(SinkError),

    #[error("failed to record forecast: {0}")]
    Storage(SinkError),
}

impl ForecastError {
    /// HTTP-style status an API layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ForecastError::InsufficientHistory { .. } | ForecastError::InvalidHorizon => 400,
            ForecastError::History(_) | ForecastError::Storage(_) => 500,
        }
    }
}

/// Failure writing to (or reading from) a persistence or notification collaborator
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("notification channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("stream closed")]
    Closed,

    #[error("unknown message id: {0}")]
    UnknownMessage(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_status_codes() {
        let short = ForecastError::InsufficientHistory { found: 23, required: 24 };
        assert_eq!(short.status_code(), 400);
        assert_eq!(ForecastError::InvalidHorizon.status_code(), 400);

        let storage = ForecastError::Storage(SinkError::ChannelClosed);
        assert_eq!(storage.status_code(), 500);
    }

    #[test]
    fn test_insufficient_history_message_names_counts() {
        let err = ForecastError::InsufficientHistory { found: 5, required: 24 };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains("24"));
    }
}
