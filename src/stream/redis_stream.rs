//! Redis stream consumer
//!
//! Reads with `XREAD COUNT n BLOCK ms STREAMS key last_id` and acknowledges
//! by deleting the entry (`XDEL`). The cursor starts at `$`, so only entries
//! added after startup are consumed; afterwards it follows the last id
//! delivered, which keeps entries added between two reads from being skipped.

use super::{ReadingStream, StreamMessage};
use crate::error::StreamError;
use async_trait::async_trait;
use redis::aio::Connection;
use redis::streams::StreamReadReply;
use redis::Client;
use std::time::Duration;

pub const DEFAULT_READINGS_STREAM: &str = "ml:readings";
/// Entry field carrying the JSON reading
pub const DEFAULT_PAYLOAD_FIELD: &str = "payload";

pub struct RedisReadingStream {
    client: Client,
    key: String,
    last_id: String,
    conn: Option<Connection>,
}

impl RedisReadingStream {
    /// Does not connect; the connection is opened on first read
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, StreamError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            key: key.into(),
            last_id: "$".to_string(),
            conn: None,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    async fn connection(&mut self) -> Result<&mut Connection, StreamError> {
        if self.conn.is_none() {
            let conn = self.client.get_async_connection().await?;
            log::info!("✅ Connected to Redis stream {}", self.key);
            self.conn = Some(conn);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(StreamError::Closed),
        }
    }
}

fn block_millis(block: Duration) -> u64 {
    // BLOCK 0 means wait forever
    (block.as_millis() as u64).max(1)
}

#[async_trait]
impl ReadingStream for RedisReadingStream {
    async fn read_batch(&mut self, max: usize, block: Duration) -> Result<Vec<StreamMessage>, StreamError> {
        let key = self.key.clone();
        let last_id = self.last_id.clone();
        let conn = self.connection().await?;

        let reply: Result<Option<StreamReadReply>, redis::RedisError> = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(block_millis(block))
            .arg("STREAMS")
            .arg(&key)
            .arg(&last_id)
            .query_async(conn)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                // Reconnect on the next read
                self.conn = None;
                return Err(e.into());
            }
        };

        let mut messages = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                let payload: String = entry.get(DEFAULT_PAYLOAD_FIELD).unwrap_or_default();
                messages.push(StreamMessage {
                    id: entry.id,
                    payload,
                });
            }
        }

        if let Some(last) = messages.last() {
            self.last_id = last.id.clone();
        }

        Ok(messages)
    }

    async fn ack(&mut self, id: &str) -> Result<(), StreamError> {
        let key = self.key.clone();
        let conn = self.connection().await?;

        let result: Result<i64, redis::RedisError> = redis::cmd("XDEL").arg(&key).arg(id).query_async(conn).await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.conn = None;
                Err(e.into())
            }
        }
    }

    fn stream_type(&self) -> &'static str {
        "redis"
    }
}
