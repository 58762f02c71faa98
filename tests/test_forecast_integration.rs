//! Forecast service against a real SQLite store
//!
//! Readings are written through the store, aggregated into hourly history
//! by SQL, forecast, and the resulting rows read back.

#[cfg(test)]
mod forecast_integration_tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use powerwatch::error::ForecastError;
    use powerwatch::forecast::ForecastEngine;
    use powerwatch::service::MlService;
    use powerwatch::sinks::{ReadingStore, SqliteStore};
    use powerwatch::types::Reading;
    use powerwatch::window::WindowStore;
    use rusqlite::{params, Connection};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn reading(device_id: &str, at: DateTime<Utc>, power_w: f64) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            site_id: "site-a".to_string(),
            timestamp: at,
            power_w,
            voltage_v: None,
            current_a: None,
        }
    }

    /// Two readings per hour for the `hours` hours before `now()`
    async fn seed(store: &SqliteStore, device_id: &str, hours: i64) {
        for h in 1..=hours {
            let hour = now() - Duration::hours(h);
            store.write_reading(&reading(device_id, hour, 100.0)).await.unwrap();
            store
                .write_reading(&reading(device_id, hour + Duration::minutes(30), 120.0))
                .await
                .unwrap();
        }
    }

    fn service(store: Arc<SqliteStore>) -> MlService {
        MlService::new(Arc::new(WindowStore::with_defaults()), store.clone(), store)
            .with_forecaster(ForecastEngine::new_with_clock(Box::new(now)))
    }

    #[tokio::test]
    async fn test_forecast_from_a_day_of_history() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("powerwatch.db");
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        seed(&store, "dev-1", 24).await;

        let points = service(store).forecast("dev-1", 24).await.unwrap();

        assert_eq!(points.len(), 24);
        assert_eq!(points[0].time, now());
        for p in &points {
            // Every hour averages to 110W, so each bucket has one point
            assert!((p.predicted_power_w - 110.0).abs() < 1e-9);
            assert!((p.confidence_upper - (110.0 + 1.96 * 11.0)).abs() < 1e-9);
            assert!(p.confidence_lower >= 0.0);
        }

        let conn = Connection::open(&db_path).unwrap();
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM forecasts WHERE device_id = ?1 AND model_version = 'simple_ma_v1'",
                params!["dev-1"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 24);
    }

    #[tokio::test]
    async fn test_forecast_with_23_hours_is_rejected() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("powerwatch.db");
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        seed(&store, "dev-1", 23).await;

        let err = service(store).forecast("dev-1", 24).await.unwrap_err();

        assert!(matches!(err, ForecastError::InsufficientHistory { found: 23, required: 24 }));
        assert_eq!(err.status_code(), 400);

        let conn = Connection::open(&db_path).unwrap();
        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM forecasts", [], |row| row.get(0)).unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_history_older_than_a_week_is_ignored() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path().join("powerwatch.db")).unwrap());

        // 30 hours of data, all more than 7 days old
        for h in 0..30 {
            let at = now() - Duration::days(8) - Duration::hours(h);
            store.write_reading(&reading("dev-old", at, 100.0)).await.unwrap();
        }

        let err = service(store).forecast("dev-old", 24).await.unwrap_err();

        assert!(matches!(err, ForecastError::InsufficientHistory { found: 0, .. }));
    }
}
