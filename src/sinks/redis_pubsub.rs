//! Redis pub/sub anomaly notifier

use super::AnomalyNotifier;
use crate::error::SinkError;
use crate::types::AnomalyNotification;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

pub const DEFAULT_ANOMALY_CHANNEL: &str = "anomalies";

/// Publishes `{device_id, site_id, anomaly}` JSON on a Redis channel
///
/// Publishes share one `ConnectionManager`, opened on the first publish.
/// The manager reconnects on its own after the server drops it; a failed
/// first connect leaves it unset and the next publish tries again.
#[derive(Clone)]
pub struct RedisNotifier {
    client: redis::Client,
    channel: String,
    manager: OnceCell<ConnectionManager>,
}

impl RedisNotifier {
    /// Parses the URL; no connection is made until the first publish
    pub fn new(redis_url: &str, channel: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            channel: channel.into(),
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, SinkError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                log::info!("✅ Connected to Redis for anomaly channel '{}'", self.channel);
                Ok::<_, SinkError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl AnomalyNotifier for RedisNotifier {
    async fn publish(&self, notification: &AnomalyNotification) -> Result<(), SinkError> {
        let payload = serde_json::to_string(notification)?;

        let mut conn = self.connection().await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;

        log::debug!(
            "📣 Published anomaly for {} on '{}' ({} subscribers)",
            notification.device_id,
            self.channel,
            receivers
        );
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let notifier = RedisNotifier::new("redis://127.0.0.1:1", DEFAULT_ANOMALY_CHANNEL).unwrap();
        assert_eq!(notifier.channel(), "anomalies");
        assert_eq!(notifier.sink_type(), "redis");
        assert!(notifier.manager.get().is_none());
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried_on_next_publish() {
        use crate::types::{AnomalyResult, AnomalyType, Severity};

        let notifier = RedisNotifier::new("redis://127.0.0.1:1", DEFAULT_ANOMALY_CHANNEL).unwrap();
        let notification = AnomalyNotification {
            device_id: "dev-1".to_string(),
            site_id: "site-a".to_string(),
            anomaly: AnomalyResult {
                is_anomaly: true,
                score: 4.0,
                kind: AnomalyType::Spike,
                severity: Severity::Medium,
                confidence: 0.8,
                expected_value: 100.0,
                actual_value: 140.0,
                explanation: "spike".to_string(),
            },
        };

        assert!(notifier.publish(&notification).await.is_err());
        assert!(notifier.manager.get().is_none());
        assert!(notifier.publish(&notification).await.is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisNotifier::new("not a url", "anomalies").is_err());
    }
}
