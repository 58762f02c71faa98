//! In-process notifiers for tests, embedding and local runs

use super::AnomalyNotifier;
use crate::error::SinkError;
use crate::types::AnomalyNotification;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Forwards notifications into a tokio channel
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<AnomalyNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnomalyNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AnomalyNotifier for ChannelNotifier {
    async fn publish(&self, notification: &AnomalyNotification) -> Result<(), SinkError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| SinkError::ChannelClosed)
    }

    fn sink_type(&self) -> &'static str {
        "channel"
    }
}

/// Writes each notification to the log as JSON
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl AnomalyNotifier for LogNotifier {
    async fn publish(&self, notification: &AnomalyNotification) -> Result<(), SinkError> {
        let payload = serde_json::to_string(notification)?;
        log::warn!("anomaly notification: {}", payload);
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "log"
    }
}
