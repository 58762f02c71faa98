//! Sliding-window anomaly classification with configurable thresholds
//!
//! The detector is a pure function of `(reading, window)`: it keeps no state
//! between calls, so the same window snapshot and reading always give the
//! same verdict.
//!
//! # Rules (first match wins)
//! 1. **spike / drop**: z-score above `z_threshold`
//! 2. **sudden_change**: relative change from the previous reading above `rate_threshold`
//! 3. **pattern_change**: z-score above `pattern_z_threshold` on a long enough
//!    window, and the recent mean deviates from the baseline by more than
//!    `pattern_deviation`
//! 4. otherwise **normal**
//!
//! Statistics are computed over the window *excluding* the current reading.

use crate::stats::{mean, std_dev};
use crate::types::{AnomalyResult, AnomalyType, Reading, Severity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorThresholds {
    /// Window length below which no verdict is attempted
    pub min_samples: usize,
    pub z_threshold: f64,
    /// z-score above which a spike/drop is `high` severity
    pub high_severity_z: f64,
    pub rate_threshold: f64,
    pub pattern_z_threshold: f64,
    pub pattern_min_samples: usize,
    pub recent_samples: usize,
    pub pattern_deviation: f64,
    pub pattern_confidence: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            min_samples: 30,
            z_threshold: 3.0,
            high_severity_z: 5.0,
            rate_threshold: 0.5,
            pattern_z_threshold: 2.0,
            pattern_min_samples: 50,
            recent_samples: 10,
            pattern_deviation: 0.3,
            pattern_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: DetectorThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn with_defaults() -> Self {
        Self::new(DetectorThresholds::default())
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    pub fn detect(&self, reading: &Reading, window: &[f64]) -> AnomalyResult {
        self.classify(reading.power_w, window)
    }

    /// Classify `power_w` against `window`
    ///
    /// `window` must already end with the current reading.
    pub fn classify(&self, power_w: f64, window: &[f64]) -> AnomalyResult {
        let t = &self.thresholds;

        if window.len() < t.min_samples || window.len() < 2 {
            return AnomalyResult {
                is_anomaly: false,
                score: 0.0,
                kind: AnomalyType::InsufficientData,
                severity: Severity::Low,
                confidence: 0.0,
                expected_value: power_w,
                actual_value: power_w,
                explanation: format!(
                    "Insufficient historical data ({} of {} readings)",
                    window.len(),
                    t.min_samples
                ),
            };
        }

        let history = &window[..window.len() - 1];
        let baseline = mean(history);
        let std = std_dev(history);

        let z_score = if std > 0.0 {
            (power_w - baseline).abs() / std
        } else {
            0.0
        };

        let previous = history[history.len() - 1];
        let rate_of_change = if previous > 0.0 {
            (power_w - previous).abs() / previous
        } else {
            0.0
        };

        let mut result = AnomalyResult {
            is_anomaly: false,
            score: z_score,
            kind: AnomalyType::Normal,
            severity: Severity::Low,
            confidence: 0.0,
            expected_value: baseline,
            actual_value: power_w,
            explanation: format!(
                "Normal operation: {:.1}W vs expected {:.1}W (z-score: {:.2})",
                power_w, baseline, z_score
            ),
        };

        if z_score > t.z_threshold {
            let kind = if power_w > baseline {
                AnomalyType::Spike
            } else {
                AnomalyType::Drop
            };
            result.is_anomaly = true;
            result.kind = kind;
            result.severity = if z_score > t.high_severity_z {
                Severity::High
            } else {
                Severity::Medium
            };
            result.confidence = (z_score / t.high_severity_z).min(1.0);
            result.explanation = format!(
                "Power {} detected: {:.1}W vs expected {:.1}W (z-score: {:.2})",
                kind, power_w, baseline, z_score
            );
        } else if rate_of_change > t.rate_threshold {
            let direction = if power_w > previous { "increase" } else { "decrease" };
            result.is_anomaly = true;
            result.kind = AnomalyType::SuddenChange;
            result.severity = Severity::Medium;
            result.confidence = rate_of_change.min(1.0);
            result.explanation = format!(
                "Sudden power change: {:.1}% {} ({:.1}W -> {:.1}W)",
                rate_of_change * 100.0,
                direction,
                previous,
                power_w
            );
        } else if z_score > t.pattern_z_threshold && window.len() >= t.pattern_min_samples {
            let recent_start = window.len().saturating_sub(t.recent_samples);
            let recent_mean = mean(&window[recent_start..]);

            // A zero baseline carries no pattern-change signal
            if baseline != 0.0 && (recent_mean - baseline).abs() / baseline > t.pattern_deviation {
                result.is_anomaly = true;
                result.kind = AnomalyType::PatternChange;
                result.severity = Severity::Low;
                result.confidence = t.pattern_confidence;
                result.explanation = format!(
                    "Pattern deviation detected: recent average {:.1}W differs from baseline {:.1}W",
                    recent_mean, baseline
                );
            }
        }

        result
    }
}
