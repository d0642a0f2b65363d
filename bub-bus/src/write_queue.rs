//! Bounded per-connection write queue
//!
//! Each connection owns one queue between the routing layer and its
//! WebSocket sink. Publishing never blocks on a slow recipient: a push
//! either enqueues immediately or, when the queue is at capacity, evicts the
//! oldest undelivered frame and records a `delivery_dropped` event. One
//! drain task per connection moves frames from the queue into the sink.
//!
//! Invariant: frames for one connection leave the queue in push order, minus
//! any evicted by overflow.

use bub_core::{Error, Result};
use futures::SinkExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

/// Default queue capacity per connection
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

type WsSink = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// Bounded drop-oldest frame queue for one connection
#[derive(Clone)]
pub struct WriteQueue {
    frames: Arc<Mutex<VecDeque<Message>>>,
    notify: Arc<Notify>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl WriteQueue {
    /// Create a queue holding at most `capacity` undelivered frames
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            capacity: capacity.max(1),
            dropped: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a frame for delivery
    ///
    /// Returns `Ok(true)` when the queue was full and the oldest frame was
    /// evicted to make room. Fails with `ConnectionClosed` once the queue
    /// has been closed.
    pub async fn push(&self, message: Message) -> Result<bool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        let evicted = {
            let mut frames = self.frames.lock().await;
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front();
                true
            } else {
                false
            };
            frames.push_back(message);
            evicted
        };
        if evicted {
            let total = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(
                dropped_total = total,
                capacity = self.capacity,
                "delivery_dropped: write queue overflow, oldest frame evicted"
            );
        }
        self.notify.notify_one();
        Ok(evicted)
    }

    /// Total frames evicted by overflow since the queue was created
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Number of frames currently waiting
    pub async fn len(&self) -> usize {
        self.frames.lock().await.len()
    }

    /// True when no frames are waiting
    pub async fn is_empty(&self) -> bool {
        self.frames.lock().await.is_empty()
    }

    /// Close the queue; subsequent pushes fail and the drain task exits
    /// after flushing what is already queued
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Move frames from the queue into the WebSocket sink until the queue
    /// is closed and empty, or the sink fails
    pub async fn drain(&self, mut sink: WsSink) -> Result<()> {
        loop {
            let next = { self.frames.lock().await.pop_front() };
            match next {
                Some(message) => {
                    sink.send(message)
                        .await
                        .map_err(|e| Error::Transport(e.to_string()))?;
                }
                None => {
                    if self.closed.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    self.notify.notified().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(n: usize) -> Message {
        Message::Text(format!("frame-{}", n))
    }

    #[tokio::test]
    async fn test_push_preserves_order() {
        let queue = WriteQueue::new(8);
        for n in 0..3 {
            assert!(!queue.push(text(n)).await.unwrap());
        }
        assert_eq!(queue.len().await, 3);

        let mut frames = queue.frames.lock().await;
        assert_eq!(frames.pop_front(), Some(text(0)));
        assert_eq!(frames.pop_front(), Some(text(1)));
        assert_eq!(frames.pop_front(), Some(text(2)));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let queue = WriteQueue::new(2);
        assert!(!queue.push(text(0)).await.unwrap());
        assert!(!queue.push(text(1)).await.unwrap());
        assert!(queue.push(text(2)).await.unwrap());

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len().await, 2);

        let mut frames = queue.frames.lock().await;
        assert_eq!(frames.pop_front(), Some(text(1)));
        assert_eq!(frames.pop_front(), Some(text(2)));
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let queue = WriteQueue::new(2);
        queue.close();
        let result = queue.push(text(0)).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_capacity_floor_is_one() {
        let queue = WriteQueue::new(0);
        assert!(!queue.push(text(0)).await.unwrap());
        assert!(queue.push(text(1)).await.unwrap());
        assert_eq!(queue.len().await, 1);
    }
}
