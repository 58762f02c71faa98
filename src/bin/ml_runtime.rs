//! ML Runtime - live anomaly detection over the readings stream
//!
//! Wires the Redis readings stream, the per-device window store, the
//! detector and the anomaly sinks, then runs the stream coordinator until
//! CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin ml_runtime
//!
//! Environment variables: see `ServiceConfig::from_env`.

use dotenv::dotenv;
use log::{error, info};
use powerwatch::config::ServiceConfig;
use powerwatch::coordinator::{Sinks, StreamCoordinator};
use powerwatch::service::MlService;
use powerwatch::sinks::{AnomalyStore, ReadingStore, RedisNotifier, SqliteStore};
use powerwatch::stream::RedisReadingStream;
use powerwatch::window::WindowStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("🚀 ML Runtime");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Redis: {}", config.redis_url);
    info!("   ├─ Readings stream: {}", config.readings_stream);
    info!("   ├─ Anomaly channel: {}", config.anomaly_channel);
    info!("   ├─ Window capacity: {}", config.window_capacity);
    info!("   ├─ Max tracked devices: {}", config.max_tracked_devices);
    info!("   └─ Record readings: {}", config.record_readings);

    let store = Arc::new(SqliteStore::new(&config.db_path)?);
    let windows = Arc::new(WindowStore::new(config.window_capacity, config.eviction_policy()));
    let service = Arc::new(MlService::new(windows, store.clone(), store.clone()));

    let stream = RedisReadingStream::new(&config.redis_url, config.readings_stream.clone())?;
    let notifier = RedisNotifier::new(&config.redis_url, config.anomaly_channel.clone())?;

    let anomalies: Arc<dyn AnomalyStore> = store.clone();
    let readings = if config.record_readings {
        Some(store as Arc<dyn ReadingStore>)
    } else {
        None
    };

    let sinks = Sinks {
        notifier: Arc::new(notifier),
        anomalies,
        readings,
    };

    let mut coordinator = StreamCoordinator::new(config.coordinator, Box::new(stream), service, sinks);

    coordinator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("❌ Failed to listen for CTRL+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("👋 ML Runtime stopped");
    Ok(())
}
