//! On-demand entry points: detect, forecast, health
//!
//! `detect` shares the `WindowStore` with the stream coordinator, so a
//! reading submitted here lands in the same per-device window the stream
//! loop appends to.

use crate::detector::AnomalyDetector;
use crate::error::{ForecastError, IngestError};
use crate::forecast::{ForecastEngine, HISTORY_DAYS, MAX_HORIZON_HOURS, MODEL_VERSION};
use crate::sinks::{ForecastStore, HistorySource};
use crate::types::{AnomalyResult, ForecastPoint, HealthStatus, Reading};
use crate::window::WindowStore;
use chrono::Duration;
use std::sync::Arc;

pub const SERVICE_NAME: &str = "ml";

pub struct MlService {
    windows: Arc<WindowStore>,
    detector: AnomalyDetector,
    forecaster: ForecastEngine,
    history: Arc<dyn HistorySource>,
    forecasts: Arc<dyn ForecastStore>,
}

impl MlService {
    pub fn new(
        windows: Arc<WindowStore>,
        history: Arc<dyn HistorySource>,
        forecasts: Arc<dyn ForecastStore>,
    ) -> Self {
        Self {
            windows,
            detector: AnomalyDetector::with_defaults(),
            forecaster: ForecastEngine::new(),
            history,
            forecasts,
        }
    }

    pub fn with_detector(mut self, detector: AnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_forecaster(mut self, forecaster: ForecastEngine) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn windows(&self) -> &Arc<WindowStore> {
        &self.windows
    }

    /// Append the reading to its device window and classify it
    pub fn detect(&self, reading: &Reading) -> AnomalyResult {
        self.windows.observe(&reading.device_id, reading.power_w, reading.timestamp, |window| {
            self.detector.detect(reading, &window.values())
        })
    }

    /// Parse a raw JSON reading, then `detect`
    pub fn ingest(&self, payload: &str) -> Result<(Reading, AnomalyResult), IngestError> {
        let reading = Reading::from_json(payload)?;
        let result = self.detect(&reading);
        Ok((reading, result))
    }

    /// Forecast the next `horizon_hours` for a device and record the result
    pub async fn forecast(&self, device_id: &str, horizon_hours: u32) -> Result<Vec<ForecastPoint>, ForecastError> {
        if horizon_hours == 0 || horizon_hours > MAX_HORIZON_HOURS {
            return Err(ForecastError::InvalidHorizon);
        }

        let since = self.forecaster.now() - Duration::days(HISTORY_DAYS);
        let history = self
            .history
            .hourly_history(device_id, since)
            .await
            .map_err(ForecastError::History)?;

        let points = self.forecaster.forecast(horizon_hours, &history)?;

        self.forecasts
            .write_forecasts(device_id, &points, MODEL_VERSION)
            .await
            .map_err(ForecastError::Storage)?;

        log::info!(
            "📈 Forecast {} hours for {} from {} hourly points",
            horizon_hours,
            device_id,
            history.len()
        );

        Ok(points)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::types::{AnomalyType, HourlyAverage};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHistory {
        points: Vec<HourlyAverage>,
        since: Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl HistorySource for FakeHistory {
        async fn hourly_history(&self, _device_id: &str, since: DateTime<Utc>) -> Result<Vec<HourlyAverage>, SinkError> {
            *self.since.lock().unwrap() = Some(since);
            Ok(self.points.clone())
        }
    }

    #[derive(Default)]
    struct FakeForecasts {
        written: Mutex<Vec<(String, usize, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ForecastStore for FakeForecasts {
        async fn write_forecasts(&self, device_id: &str, points: &[ForecastPoint], model_version: &str) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::ChannelClosed);
            }
            self.written
                .lock()
                .unwrap()
                .push((device_id.to_string(), points.len(), model_version.to_string()));
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn hours(n: usize) -> Vec<HourlyAverage> {
        (0..n)
            .map(|i| HourlyAverage {
                hour: now() - Duration::hours(n as i64 - i as i64),
                avg_power_w: 100.0,
            })
            .collect()
    }

    fn service(history: Arc<FakeHistory>, forecasts: Arc<FakeForecasts>) -> MlService {
        MlService::new(Arc::new(WindowStore::with_defaults()), history, forecasts)
            .with_forecaster(ForecastEngine::new_with_clock(Box::new(now)))
    }

    fn reading(power_w: f64) -> Reading {
        Reading {
            device_id: "dev-1".to_string(),
            site_id: "site-a".to_string(),
            timestamp: now(),
            power_w,
            voltage_v: None,
            current_a: None,
        }
    }

    #[tokio::test]
    async fn test_forecast_records_points() {
        let history = Arc::new(FakeHistory {
            points: hours(24),
            ..Default::default()
        });
        let forecasts = Arc::new(FakeForecasts::default());
        let svc = service(history.clone(), forecasts.clone());

        let points = svc.forecast("dev-1", 12).await.unwrap();

        assert_eq!(points.len(), 12);
        assert_eq!(*history.since.lock().unwrap(), Some(now() - Duration::days(7)));
        let written = forecasts.written.lock().unwrap();
        assert_eq!(written.as_slice(), &[("dev-1".to_string(), 12, "simple_ma_v1".to_string())]);
    }

    #[tokio::test]
    async fn test_forecast_short_history_is_client_error() {
        let history = Arc::new(FakeHistory {
            points: hours(23),
            ..Default::default()
        });
        let forecasts = Arc::new(FakeForecasts::default());
        let svc = service(history, forecasts.clone());

        let err = svc.forecast("dev-1", 24).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert!(forecasts.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forecast_storage_failure_surfaces() {
        let history = Arc::new(FakeHistory {
            points: hours(48),
            ..Default::default()
        });
        let forecasts = Arc::new(FakeForecasts {
            fail: true,
            ..Default::default()
        });
        let svc = service(history, forecasts);

        let err = svc.forecast("dev-1", 24).await.unwrap_err();

        assert!(matches!(err, ForecastError::Storage(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_oversized_horizon_rejected_before_history_load() {
        let history = Arc::new(FakeHistory {
            points: hours(48),
            ..Default::default()
        });
        let forecasts = Arc::new(FakeForecasts::default());
        let svc = service(history.clone(), forecasts.clone());

        let err = svc.forecast("dev-1", u32::MAX).await.unwrap_err();

        assert!(matches!(err, ForecastError::InvalidHorizon));
        assert_eq!(err.status_code(), 400);
        assert!(history.since.lock().unwrap().is_none());
        assert!(forecasts.written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_detect_shares_window_state() {
        let svc = service(Arc::new(FakeHistory::default()), Arc::new(FakeForecasts::default()));

        for i in 0..30 {
            let result = svc.detect(&reading(if i % 2 == 0 { 90.0 } else { 110.0 }));
            if i < 29 {
                assert_eq!(result.kind, AnomalyType::InsufficientData);
            }
        }
        let result = svc.detect(&reading(170.0));

        assert!(result.is_anomaly);
        assert_eq!(result.kind, AnomalyType::Spike);
        assert_eq!(svc.windows().snapshot("dev-1").unwrap().len(), 31);
    }

    #[test]
    fn test_ingest_rejects_bad_timestamp() {
        let svc = service(Arc::new(FakeHistory::default()), Arc::new(FakeForecasts::default()));

        let err = svc
            .ingest(r#"{"device_id":"d","site_id":"s","ts":"yesterday","power_w":1.0}"#)
            .unwrap_err();

        assert!(matches!(err, IngestError::InvalidTimestamp(_)));
        assert!(!svc.windows().contains("d"));
    }

    #[test]
    fn test_health() {
        let svc = service(Arc::new(FakeHistory::default()), Arc::new(FakeForecasts::default()));
        let health = svc.health();

        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "ml");
    }
}
