//! Core data structures for readings, anomaly verdicts and forecasts
//!
//! All JSON shapes match what the ingest side writes to the readings stream
//! and what downstream consumers of the `anomalies` channel expect.

use crate::error::IngestError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single power-meter sample, immutable once received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawReading")]
pub struct Reading {
    pub device_id: String,
    pub site_id: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub power_w: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_a: Option<f64>,
}

/// Wire shape of a reading before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub device_id: String,
    pub site_id: String,
    #[serde(alias = "timestamp")]
    pub ts: String,
    pub power_w: f64,
    #[serde(default)]
    pub voltage_v: Option<f64>,
    #[serde(default)]
    pub current_a: Option<f64>,
}

impl TryFrom<RawReading> for Reading {
    type Error = IngestError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        if raw.device_id.trim().is_empty() {
            return Err(IngestError::InvalidField {
                field: "device_id",
                reason: "must not be empty".to_string(),
            });
        }
        if raw.site_id.trim().is_empty() {
            return Err(IngestError::InvalidField {
                field: "site_id",
                reason: "must not be empty".to_string(),
            });
        }
        if !raw.power_w.is_finite() {
            return Err(IngestError::InvalidField {
                field: "power_w",
                reason: format!("must be finite, got {}", raw.power_w),
            });
        }

        let timestamp = parse_timestamp(&raw.ts)?;

        Ok(Self {
            device_id: raw.device_id,
            site_id: raw.site_id,
            timestamp,
            power_w: raw.power_w,
            voltage_v: raw.voltage_v,
            current_a: raw.current_a,
        })
    }
}

impl Reading {
    /// Parse and validate a JSON payload from the readings stream
    pub fn from_json(payload: &str) -> Result<Self, IngestError> {
        let raw: RawReading = serde_json::from_str(payload)?;
        Reading::try_from(raw)
    }
}

/// Parse an ISO-8601 instant
///
/// Offsets (including `Z`) are honoured; a timestamp without an offset is
/// taken as UTC.
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, IngestError> {
    let ts = ts.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(IngestError::InvalidTimestamp(ts.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Normal,
    Spike,
    Drop,
    SuddenChange,
    PatternChange,
    InsufficientData,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Normal => "normal",
            AnomalyType::Spike => "spike",
            AnomalyType::Drop => "drop",
            AnomalyType::SuddenChange => "sudden_change",
            AnomalyType::PatternChange => "pattern_change",
            AnomalyType::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one reading against its device window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    /// Always the z-score of the reading, whichever rule fired
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: AnomalyType,
    pub severity: Severity,
    pub confidence: f64,
    pub expected_value: f64,
    pub actual_value: f64,
    pub explanation: String,
}

/// Payload published on the anomaly notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyNotification {
    pub device_id: String,
    pub site_id: String,
    pub anomaly: AnomalyResult,
}

impl AnomalyNotification {
    pub fn new(reading: &Reading, anomaly: &AnomalyResult) -> Self {
        Self {
            device_id: reading.device_id.clone(),
            site_id: reading.site_id.clone(),
            anomaly: anomaly.clone(),
        }
    }
}

/// One hour of aggregated history for a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyAverage {
    pub hour: DateTime<Utc>,
    pub avg_power_w: f64,
}

/// A single forecast step with its 95% band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    pub predicted_power_w: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}
