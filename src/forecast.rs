//! Seasonal-naive forecaster over hourly history
//!
//! History is split into 24 buckets by *position* (`index % 24`), not by the
//! calendar hour of each point. With gap-free history starting at midnight
//! the two coincide; with gaps they drift. Stored forecasts are compared
//! across model versions, so the positional behaviour is kept as-is under
//! [`MODEL_VERSION`].
//!
//! For each step the forecast hour-of-day selects a bucket:
//! - non-empty bucket: mean of the bucket, std of the bucket (or 10% of the
//!   mean for a single point)
//! - empty bucket: mean and std of all history
//!
//! The band is `predicted ± 1.96·std`, floored at zero.

use crate::error::ForecastError;
use crate::stats::{mean, std_dev};
use crate::types::{ForecastPoint, HourlyAverage};
use chrono::{DateTime, Duration, Timelike, Utc};

/// Tag stored with every forecast row
pub const MODEL_VERSION: &str = "simple_ma_v1";

pub const MIN_HISTORY_POINTS: usize = 24;
pub const DEFAULT_HORIZON_HOURS: u32 = 24;
/// Longest horizon served; one week ahead
pub const MAX_HORIZON_HOURS: u32 = 7 * 24;
/// Days of hourly history the forecaster is fed
pub const HISTORY_DAYS: i64 = 7;

const HOURS_PER_DAY: usize = 24;
/// Two-sided 95% normal quantile
const BAND_Z: f64 = 1.96;
const SINGLE_POINT_STD_RATIO: f64 = 0.1;

pub struct ForecastEngine {
    min_history: usize,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl ForecastEngine {
    /// Engine using the system clock for the forecast origin
    pub fn new() -> Self {
        Self::new_with_clock(Box::new(Utc::now))
    }

    /// Engine with a custom clock (deterministic tests)
    pub fn new_with_clock(now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self {
            min_history: MIN_HISTORY_POINTS,
            now_fn,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_fn)()
    }

    pub fn model_version(&self) -> &'static str {
        MODEL_VERSION
    }

    /// Forecast `horizon_hours` hourly points starting now
    ///
    /// `history` must be ordered by hour ascending, one value per hour
    /// (missing hours simply absent).
    pub fn forecast(
        &self,
        horizon_hours: u32,
        history: &[HourlyAverage],
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        if horizon_hours == 0 || horizon_hours > MAX_HORIZON_HOURS {
            return Err(ForecastError::InvalidHorizon);
        }
        if history.len() < self.min_history {
            return Err(ForecastError::InsufficientHistory {
                found: history.len(),
                required: self.min_history,
            });
        }

        let values: Vec<f64> = history.iter().map(|h| h.avg_power_w).collect();

        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); HOURS_PER_DAY];
        for (index, value) in values.iter().enumerate() {
            buckets[index % HOURS_PER_DAY].push(*value);
        }

        let overall_mean = mean(&values);
        let overall_std = std_dev(&values);
        let origin = self.now();

        let points = (0..horizon_hours)
            .map(|step| {
                let time = origin + Duration::hours(i64::from(step));
                let bucket = &buckets[time.hour() as usize];

                let (predicted, std) = match bucket.len() {
                    0 => (overall_mean, overall_std),
                    1 => (bucket[0], bucket[0] * SINGLE_POINT_STD_RATIO),
                    _ => (mean(bucket), std_dev(bucket)),
                };

                band(time, predicted, std)
            })
            .collect();

        Ok(points)
    }
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Unlike a plain bucket mean, `predicted` is floored at zero so the band
/// always contains it.
fn band(time: DateTime<Utc>, predicted: f64, std: f64) -> ForecastPoint {
    let predicted = predicted.max(0.0);
    let spread = BAND_Z * std.abs();

    ForecastPoint {
        time,
        predicted_power_w: predicted,
        confidence_lower: (predicted - spread).max(0.0),
        confidence_upper: predicted + spread,
    }
}
