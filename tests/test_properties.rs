//! Property tests for the detector, window store and forecaster

#[cfg(test)]
mod property_tests {
    use chrono::{Duration, TimeZone, Utc};
    use powerwatch::detector::AnomalyDetector;
    use powerwatch::forecast::ForecastEngine;
    use powerwatch::types::{AnomalyType, HourlyAverage};
    use powerwatch::window::{EvictionPolicy, WindowStore};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn forecast_band_always_brackets_prediction(
            values in prop::collection::vec(-500.0f64..5_000.0, 24..200),
            horizon in 1u32..72,
            start_hour in 0u32..24,
        ) {
            let now = Utc.with_ymd_and_hms(2024, 6, 10, start_hour, 0, 0).unwrap();
            let engine = ForecastEngine::new_with_clock(Box::new(move || now));
            let origin = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
            let history: Vec<HourlyAverage> = values
                .iter()
                .enumerate()
                .map(|(i, v)| HourlyAverage { hour: origin + Duration::hours(i as i64), avg_power_w: *v })
                .collect();

            let points = engine.forecast(horizon, &history).unwrap();

            prop_assert_eq!(points.len(), horizon as usize);
            for p in points {
                prop_assert!(p.confidence_lower >= 0.0);
                prop_assert!(p.confidence_lower <= p.predicted_power_w);
                prop_assert!(p.predicted_power_w <= p.confidence_upper);
            }
        }

        #[test]
        fn short_windows_never_flag(window in prop::collection::vec(0.0f64..10_000.0, 1..30)) {
            let detector = AnomalyDetector::with_defaults();
            let current = window[window.len() - 1];

            let result = detector.classify(current, &window);

            prop_assert!(!result.is_anomaly);
            prop_assert_eq!(result.kind, AnomalyType::InsufficientData);
        }

        #[test]
        fn classification_is_deterministic(window in prop::collection::vec(0.0f64..10_000.0, 30..120)) {
            let detector = AnomalyDetector::with_defaults();
            let current = window[window.len() - 1];

            let first = detector.classify(current, &window);
            let second = detector.classify(current, &window);

            prop_assert_eq!(first, second);
        }

        #[test]
        fn window_never_exceeds_capacity(
            capacity in 1usize..50,
            values in prop::collection::vec(0.0f64..1_000.0, 0..200),
        ) {
            let store = WindowStore::new(capacity, EvictionPolicy::default());
            let ts = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();

            for v in &values {
                store.append("dev", *v, ts);
            }

            let expected = values.len().min(capacity);
            let snapshot = store.snapshot("dev").unwrap_or_default();
            prop_assert_eq!(snapshot.len(), expected);
            prop_assert_eq!(&snapshot[..], &values[values.len() - expected..]);
        }
    }
}
