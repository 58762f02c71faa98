//! Inbound message-stream collaborator
//!
//! The coordinator reads bounded batches and acknowledges each message
//! after handling it. Implementations:
//! - `RedisReadingStream` - Redis stream (XREAD + XDEL)
//! - `InMemoryReadingStream` - in-process queue for tests and embedding

pub mod memory;
pub mod redis_stream;

use crate::error::StreamError;
use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::{InMemoryReadingStream, StreamProducer};
pub use self::redis_stream::{RedisReadingStream, DEFAULT_PAYLOAD_FIELD, DEFAULT_READINGS_STREAM};

/// One raw message as delivered by the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: String,
    pub payload: String,
}

#[async_trait]
pub trait ReadingStream: Send {
    /// Wait up to `block` for at least one message, returning at most `max`
    ///
    /// An empty batch means the wait timed out.
    async fn read_batch(&mut self, max: usize, block: Duration) -> Result<Vec<StreamMessage>, StreamError>;

    /// Remove a handled message from the stream
    async fn ack(&mut self, id: &str) -> Result<(), StreamError>;

    /// Stream name for logging
    fn stream_type(&self) -> &'static str;
}
