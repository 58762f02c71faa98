//! In-process reading stream
//!
//! A `StreamProducer` pushes raw payloads; the paired
//! `InMemoryReadingStream` hands them out in batches and tracks which
//! delivered messages are still unacknowledged.

use super::{ReadingStream, StreamMessage};
use crate::error::StreamError;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

#[derive(Default)]
struct Queue {
    messages: VecDeque<StreamMessage>,
    pending: HashSet<String>,
    next_id: u64,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InMemoryReadingStream {
    shared: Arc<Shared>,
}

/// Write half of an in-memory stream
#[derive(Clone)]
pub struct StreamProducer {
    shared: Arc<Shared>,
}

impl InMemoryReadingStream {
    pub fn new() -> (Self, StreamProducer) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            StreamProducer { shared },
        )
    }

    /// Delivered but not yet acknowledged
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

impl StreamProducer {
    /// Append a raw payload, returning its message id
    pub fn push(&self, payload: impl Into<String>) -> String {
        let id = {
            let mut queue = self.shared.lock();
            queue.next_id += 1;
            let id = format!("{}-0", queue.next_id);
            queue.messages.push_back(StreamMessage {
                id: id.clone(),
                payload: payload.into(),
            });
            id
        };
        self.shared.notify.notify_one();
        id
    }

    /// Reads fail with `StreamError::Closed` once the queue drains
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }

    /// Messages not yet delivered
    pub fn len(&self) -> usize {
        self.shared.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingStream for InMemoryReadingStream {
    async fn read_batch(&mut self, max: usize, block: Duration) -> Result<Vec<StreamMessage>, StreamError> {
        let deadline = Instant::now() + block;

        loop {
            {
                let mut queue = self.shared.lock();
                if !queue.messages.is_empty() {
                    let take = max.min(queue.messages.len());
                    let batch: Vec<StreamMessage> = queue.messages.drain(..take).collect();
                    for message in &batch {
                        queue.pending.insert(message.id.clone());
                    }
                    return Ok(batch);
                }
                if queue.closed {
                    return Err(StreamError::Closed);
                }
            }

            // notify_one stores a permit, so a push between the check and here is not lost
            if timeout_at(deadline, self.shared.notify.notified()).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&mut self, id: &str) -> Result<(), StreamError> {
        if self.shared.lock().pending.remove(id) {
            Ok(())
        } else {
            Err(StreamError::UnknownMessage(id.to_string()))
        }
    }

    fn stream_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_respects_batch_cap_and_order() {
        let (mut stream, producer) = InMemoryReadingStream::new();
        for i in 0..12 {
            producer.push(format!("msg-{}", i));
        }

        let first = stream.read_batch(10, Duration::from_millis(10)).await.unwrap();
        let second = stream.read_batch(10, Duration::from_millis(10)).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0].payload, "msg-0");
        assert_eq!(second[1].payload, "msg-11");
    }

    #[tokio::test]
    async fn test_empty_read_times_out() {
        let (mut stream, _producer) = InMemoryReadingStream::new();

        let batch = stream.read_batch(10, Duration::from_millis(20)).await.unwrap();

        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_read_wakes_on_push() {
        let (mut stream, producer) = InMemoryReadingStream::new();

        let handle = tokio::spawn(async move { stream.read_batch(10, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.push("late");

        let batch = handle.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, "late");
    }

    #[tokio::test]
    async fn test_ack_clears_pending() {
        let (mut stream, producer) = InMemoryReadingStream::new();
        let id = producer.push("one");

        stream.read_batch(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(stream.pending_count(), 1);

        stream.ack(&id).await.unwrap();
        assert_eq!(stream.pending_count(), 0);

        let err = stream.ack(&id).await.unwrap_err();
        assert!(matches!(err, StreamError::UnknownMessage(_)));
    }

    #[tokio::test]
    async fn test_closed_stream_drains_then_errors() {
        let (mut stream, producer) = InMemoryReadingStream::new();
        producer.push("last");
        producer.close();

        assert_eq!(stream.read_batch(10, Duration::from_millis(10)).await.unwrap().len(), 1);
        let err = stream.read_batch(10, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, StreamError::Closed));
    }
}
