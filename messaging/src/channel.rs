//! In-process channel bus implementation.
//!
//! Routes messages between components of a single process over tokio
//! broadcast channels, one per queue name. Used by the standalone
//! deployment profile and by tests; delivery is at-most-once per
//! subscriber (a publish with no subscribers is dropped).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use crate::{deliver_with_retry, MessageBus, MessageHandler, Result, RetryPolicy};

/// Buffered messages per queue before the oldest is evicted.
const QUEUE_CAPACITY: usize = 256;

/// Process-local message bus backed by broadcast channels.
pub struct ChannelBus {
    queues: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    retry: RetryPolicy,
}

impl ChannelBus {
    /// Create a new in-process bus.
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            retry,
        }
    }

    /// Get or create the sender for a queue.
    async fn sender(&self, queue: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(sender) = self.queues.read().await.get(queue) {
            return sender.clone();
        }

        let mut queues = self.queues.write().await;
        queues
            .entry(queue.to_string())
            .or_insert_with(|| broadcast::channel(QUEUE_CAPACITY).0)
            .clone()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl MessageBus for ChannelBus {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let sender = self.sender(queue).await;

        match sender.send(payload) {
            Ok(receivers) => {
                debug!(queue = %queue, receivers, "Published message in-process");
            }
            Err(_) => {
                // No subscriber on this queue in this process.
                debug!(queue = %queue, "Published message with no subscribers");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let mut receiver = self.sender(queue).await.subscribe();
        let retry = self.retry.clone();
        let queue = queue.to_string();

        info!(queue = %queue, "Subscribed in-process handler");

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => {
                        // Failures are already logged by the retry helper;
                        // a message that exhausts its retries is dropped.
                        let _ = deliver_with_retry(&handler, &queue, &payload, &retry).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        error!(queue = %queue, skipped, "Subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(queue = %queue, "Queue closed, subscriber exiting");
                        break;
                    }
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::BusError;

    struct CountingHandler {
        received: AtomicU64,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _payload: &[u8]) -> Result<()> {
            self.received.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails until `failures` attempts have been burned, then succeeds.
    struct FlakyHandler {
        failures: u64,
        attempts: AtomicU64,
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        async fn handle(&self, _payload: &[u8]) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(BusError::Handler("transient".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn wait_for(check: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscriber() {
        let bus = ChannelBus::new(RetryPolicy::none());
        let handler = Arc::new(CountingHandler {
            received: AtomicU64::new(0),
        });

        bus.subscribe("test-queue", handler.clone()).await.unwrap();
        bus.publish("test-queue", b"hello".to_vec()).await.unwrap();

        assert!(wait_for(|| handler.received.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_ok() {
        let bus = ChannelBus::new(RetryPolicy::none());

        let result = bus.publish("empty-queue", b"hello".to_vec()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failing_handler_is_retried() {
        let bus = ChannelBus::new(RetryPolicy::fixed(&[10, 10]));
        let handler = Arc::new(FlakyHandler {
            failures: 2,
            attempts: AtomicU64::new(0),
        });

        bus.subscribe("retry-queue", handler.clone()).await.unwrap();
        bus.publish("retry-queue", b"payload".to_vec()).await.unwrap();

        // Two failures, then success on the third attempt.
        assert!(wait_for(|| handler.attempts.load(Ordering::SeqCst) == 3).await);
    }

    #[tokio::test]
    async fn test_subscribers_on_different_queues_are_isolated() {
        let bus = ChannelBus::new(RetryPolicy::none());
        let handler_a = Arc::new(CountingHandler {
            received: AtomicU64::new(0),
        });
        let handler_b = Arc::new(CountingHandler {
            received: AtomicU64::new(0),
        });

        bus.subscribe("queue-a", handler_a.clone()).await.unwrap();
        bus.subscribe("queue-b", handler_b.clone()).await.unwrap();
        bus.publish("queue-a", b"only-a".to_vec()).await.unwrap();

        assert!(wait_for(|| handler_a.received.load(Ordering::SeqCst) == 1).await);
        assert_eq!(handler_b.received.load(Ordering::SeqCst), 0);
    }
}
