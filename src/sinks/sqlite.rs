//! SQLite persistence for readings, anomalies and forecasts
//!
//! Tables (created idempotently on open):
//! - `readings` - raw samples, source of the hourly history
//! - `anomalies` - append-only, one row per anomalous reading
//! - `forecasts` - append-only, tagged with the model version
//!
//! Timestamps are stored as Unix seconds.

use super::{AnomalyStore, ForecastStore, HistorySource, ReadingStore};
use crate::error::SinkError;
use crate::types::{AnomalyResult, ForecastPoint, HourlyAverage, Reading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    time INTEGER NOT NULL,
    power_w REAL NOT NULL,
    voltage_v REAL,
    current_a REAL,
    raw TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_readings_device_time ON readings(device_id, time DESC);

CREATE TABLE IF NOT EXISTS anomalies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL,
    site_id TEXT NOT NULL,
    time INTEGER NOT NULL,
    score REAL NOT NULL,
    type TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence REAL NOT NULL,
    expected_value REAL NOT NULL,
    actual_value REAL NOT NULL,
    explanation TEXT NOT NULL,
    metadata TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_anomalies_device_time ON anomalies(device_id, time DESC);

CREATE TABLE IF NOT EXISTS forecasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL,
    site_id TEXT,
    forecast_time INTEGER NOT NULL,
    predicted_power_w REAL NOT NULL,
    confidence_lower REAL NOT NULL,
    confidence_upper REAL NOT NULL,
    model_version TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_forecasts_device_time ON forecasts(device_id, forecast_time);
"#;

/// WAL journaling with a bounded WAL file
fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _pages: i64 = conn.pragma_update_and_check(None, "wal_autocheckpoint", 1000, |row| row.get(0))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database and its schema
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite store ready at {} (WAL mode)", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latest_site_id(conn: &Connection, device_id: &str) -> rusqlite::Result<Option<String>> {
        conn.query_row(
            "SELECT site_id FROM readings WHERE device_id = ?1 ORDER BY time DESC, id DESC LIMIT 1",
            params![device_id],
            |row| row.get(0),
        )
        .optional()
    }
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn write_reading(&self, reading: &Reading) -> Result<(), SinkError> {
        let raw = serde_json::to_string(reading)?;
        let conn = self.lock();

        conn.execute(
            "INSERT INTO readings (device_id, site_id, time, power_w, voltage_v, current_a, raw)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reading.device_id,
                reading.site_id,
                reading.timestamp.timestamp(),
                reading.power_w,
                reading.voltage_v,
                reading.current_a,
                raw,
            ],
        )?;

        Ok(())
    }
}

#[async_trait]
impl AnomalyStore for SqliteStore {
    async fn write_anomaly(&self, reading: &Reading, anomaly: &AnomalyResult) -> Result<(), SinkError> {
        let metadata = json!({ "raw_reading": reading }).to_string();
        let conn = self.lock();

        conn.execute(
            "INSERT INTO anomalies (device_id, site_id, time, score, type, severity, confidence,
                                    expected_value, actual_value, explanation, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                reading.device_id,
                reading.site_id,
                reading.timestamp.timestamp(),
                anomaly.score,
                anomaly.kind.as_str(),
                anomaly.severity.as_str(),
                anomaly.confidence,
                anomaly.expected_value,
                anomaly.actual_value,
                anomaly.explanation,
                metadata,
            ],
        )?;

        log::debug!("✅ Stored {} anomaly for {}", anomaly.kind, reading.device_id);
        Ok(())
    }
}

#[async_trait]
impl ForecastStore for SqliteStore {
    async fn write_forecasts(
        &self,
        device_id: &str,
        points: &[ForecastPoint],
        model_version: &str,
    ) -> Result<(), SinkError> {
        let created_at = Utc::now().timestamp();
        let mut conn = self.lock();
        let site_id = Self::latest_site_id(&conn, device_id)?;

        let tx = conn.transaction()?;
        for point in points {
            tx.execute(
                "INSERT INTO forecasts (device_id, site_id, forecast_time, predicted_power_w,
                                        confidence_lower, confidence_upper, model_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    device_id,
                    site_id,
                    point.time.timestamp(),
                    point.predicted_power_w,
                    point.confidence_lower,
                    point.confidence_upper,
                    model_version,
                    created_at,
                ],
            )?;
        }
        tx.commit()?;

        log::debug!("✅ Stored {} forecast points for {} ({})", points.len(), device_id, model_version);
        Ok(())
    }
}

#[async_trait]
impl HistorySource for SqliteStore {
    async fn hourly_history(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyAverage>, SinkError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT (time / 3600) * 3600 AS hour, AVG(power_w)
             FROM readings
             WHERE device_id = ?1 AND time > ?2
             GROUP BY hour
             ORDER BY hour ASC",
        )?;

        let rows = stmt
            .query_map(params![device_id, since.timestamp()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let history = rows
            .into_iter()
            .filter_map(|(hour, avg_power_w)| {
                DateTime::from_timestamp(hour, 0).map(|hour| HourlyAverage { hour, avg_power_w })
            })
            .collect();

        Ok(history)
    }
}
