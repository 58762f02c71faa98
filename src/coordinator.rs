//! Stream coordinator - drains inbound readings through the detector
//!
//! A single consumer driven as an explicit state machine:
//!
//! ```text
//! WaitingForMessages --batch--> Processing --ok--> WaitingForMessages
//!        |                          |
//!        +--read error--> Backoff <-+--ack error
//!                            |
//!                            +--fixed delay--> WaitingForMessages
//! ```
//!
//! Messages are handled strictly in arrival order, one at a time, so two
//! readings for the same device in one batch see each other's window state.
//! Each message is acknowledged after it is handled whatever the verdict
//! (at-most-once). Malformed payloads are logged, counted and acknowledged.
//! Sink failures are logged and never abort a batch.

use crate::config::{CoordinatorConfig, MAX_BATCH_SIZE};
use crate::error::StreamError;
use crate::service::MlService;
use crate::sinks::{AnomalyNotifier, AnomalyStore, ReadingStore};
use crate::stream::{ReadingStream, StreamMessage};
use crate::types::{AnomalyNotification, Reading};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often idle windows are swept and throughput is logged
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Where anomalies (and optionally every reading) are dispatched
#[derive(Clone)]
pub struct Sinks {
    pub notifier: Arc<dyn AnomalyNotifier>,
    pub anomalies: Arc<dyn AnomalyStore>,
    pub readings: Option<Arc<dyn ReadingStore>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    WaitingForMessages,
    Processing,
    Backoff,
}

/// Fixed-delay retry policy with unbounded retries
#[derive(Debug)]
pub struct FixedBackoff {
    delay: Duration,
    attempts: u32,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }

    pub async fn wait(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        log::warn!(
            "⏳ Backing off for {}ms (consecutive failures: {})",
            self.delay.as_millis(),
            self.attempts
        );
        tokio::time::sleep(self.delay).await;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures since the last successful batch
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Readings run through the detector
    pub processed: u64,
    pub anomalies: u64,
    /// Payloads that failed to parse or validate
    pub malformed: u64,
    pub sink_failures: u64,
    /// Reads or batches that sent the loop into backoff
    pub failed_batches: u64,
}

pub struct StreamCoordinator {
    config: CoordinatorConfig,
    stream: Box<dyn ReadingStream>,
    service: Arc<MlService>,
    sinks: Sinks,
    state: CoordinatorState,
    pending: Vec<StreamMessage>,
    backoff: FixedBackoff,
    stats: CoordinatorStats,
    last_maintenance: Instant,
    processed_at_last_log: u64,
}

impl StreamCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        stream: Box<dyn ReadingStream>,
        service: Arc<MlService>,
        sinks: Sinks,
    ) -> Self {
        let config = CoordinatorConfig {
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            ..config
        };
        Self {
            backoff: FixedBackoff::new(config.backoff()),
            config,
            stream,
            service,
            sinks,
            state: CoordinatorState::WaitingForMessages,
            pending: Vec::new(),
            stats: CoordinatorStats::default(),
            last_maintenance: Instant::now(),
            processed_at_last_log: 0,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    /// Run forever; errors only ever lead to backoff
    pub async fn run(&mut self) {
        self.log_startup();
        loop {
            self.step().await;
        }
    }

    /// Run until `shutdown` resolves
    ///
    /// A batch already being processed is finished (and acknowledged)
    /// before shutdown is honoured.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.log_startup();
        tokio::pin!(shutdown);

        loop {
            if self.state == CoordinatorState::Processing {
                self.step().await;
                continue;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("🛑 Shutdown requested, stopping stream coordinator");
                    break;
                }
                _ = self.step() => {}
            }
        }

        let stats = self.stats;
        log::info!("✅ Stream coordinator stopped");
        log::info!("   ├─ Processed: {}", stats.processed);
        log::info!("   ├─ Anomalies: {}", stats.anomalies);
        log::info!("   ├─ Malformed: {}", stats.malformed);
        log::info!("   ├─ Sink failures: {}", stats.sink_failures);
        log::info!("   └─ Failed batches: {}", stats.failed_batches);
    }

    /// Advance the state machine by one transition
    pub async fn step(&mut self) {
        match self.state {
            CoordinatorState::WaitingForMessages => {
                self.maintenance();

                match self
                    .stream
                    .read_batch(self.config.batch_size, self.config.block_timeout())
                    .await
                {
                    Ok(batch) if batch.is_empty() => {}
                    Ok(batch) => {
                        self.pending = batch;
                        self.state = CoordinatorState::Processing;
                    }
                    Err(e) => {
                        log::error!("❌ Failed to read from {} stream: {}", self.stream.stream_type(), e);
                        self.stats.failed_batches += 1;
                        self.state = CoordinatorState::Backoff;
                    }
                }
            }
            CoordinatorState::Processing => {
                let batch = std::mem::take(&mut self.pending);
                match self.process_batch(batch).await {
                    Ok(()) => {
                        self.backoff.reset();
                        self.state = CoordinatorState::WaitingForMessages;
                    }
                    Err(e) => {
                        log::error!("❌ Batch processing failed: {}", e);
                        self.stats.failed_batches += 1;
                        self.state = CoordinatorState::Backoff;
                    }
                }
            }
            CoordinatorState::Backoff => {
                self.backoff.wait().await;
                self.state = CoordinatorState::WaitingForMessages;
            }
        }
    }

    /// Handle every message in order, acknowledging each one
    ///
    /// An acknowledgement failure does not stop the rest of the batch; the
    /// first such error is returned once the batch is done.
    async fn process_batch(&mut self, batch: Vec<StreamMessage>) -> Result<(), StreamError> {
        let mut first_error = None;

        for message in batch {
            self.handle_message(&message).await;

            if let Err(e) = self.stream.ack(&message.id).await {
                log::warn!("⚠️  Failed to acknowledge message {}: {}", message.id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn handle_message(&mut self, message: &StreamMessage) {
        let reading = match Reading::from_json(&message.payload) {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("⚠️  Dropping malformed message {}: {}", message.id, e);
                self.stats.malformed += 1;
                return;
            }
        };

        let result = self.service.detect(&reading);
        self.stats.processed += 1;

        if let Some(store) = &self.sinks.readings {
            if let Err(e) = store.write_reading(&reading).await {
                log::error!("❌ Failed to record reading for {}: {}", reading.device_id, e);
                self.stats.sink_failures += 1;
            }
        }

        if !result.is_anomaly {
            return;
        }

        self.stats.anomalies += 1;
        log::info!(
            "🚨 {} anomaly on {} ({}): {}",
            result.severity,
            reading.device_id,
            result.kind,
            result.explanation
        );

        let notification = AnomalyNotification::new(&reading, &result);
        if let Err(e) = self.sinks.notifier.publish(&notification).await {
            log::error!(
                "❌ Failed to publish anomaly via {} for {}: {}",
                self.sinks.notifier.sink_type(),
                reading.device_id,
                e
            );
            self.stats.sink_failures += 1;
        }

        if let Err(e) = self.sinks.anomalies.write_anomaly(&reading, &result).await {
            log::error!("❌ Failed to store anomaly for {}: {}", reading.device_id, e);
            self.stats.sink_failures += 1;
        }
    }

    fn maintenance(&mut self) {
        let elapsed = self.last_maintenance.elapsed();
        if elapsed < MAINTENANCE_INTERVAL {
            return;
        }

        self.service.windows().evict_idle();

        let processed = self.stats.processed - self.processed_at_last_log;
        log::info!(
            "📊 Ingestion rate: {:.1} readings/sec (total: {}, anomalies: {}, devices: {})",
            processed as f64 / elapsed.as_secs_f64(),
            self.stats.processed,
            self.stats.anomalies,
            self.service.windows().device_count()
        );

        self.processed_at_last_log = self.stats.processed;
        self.last_maintenance = Instant::now();
    }

    fn log_startup(&self) {
        log::info!("🚀 Starting stream coordinator ({} stream)", self.stream.stream_type());
        log::info!("   ├─ Batch size: {}", self.config.batch_size);
        log::info!("   ├─ Block timeout: {}ms", self.config.block_timeout_ms);
        log::info!("   └─ Backoff: {}ms", self.config.backoff_ms);
    }
}
