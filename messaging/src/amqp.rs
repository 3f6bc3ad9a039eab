//! AMQP (RabbitMQ) bus implementation.
//!
//! Publishes directly to durable queues via the default exchange; the
//! queue name is the routing key. Consumers run on a background task
//! with automatic reconnection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use futures_util::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel,
};
use tracing::{debug, error, info, warn};

use crate::{deliver_with_retry, BusError, MessageBus, MessageHandler, Result, RetryPolicy};

/// Pause between consumer reconnection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// RabbitMQ message bus over pooled lapin connections.
pub struct AmqpBus {
    pool: Pool,
    retry: RetryPolicy,
}

impl AmqpBus {
    /// Connect to the broker and verify the connection.
    pub async fn connect(url: &str, retry: RetryPolicy) -> Result<Self> {
        let manager = Manager::new(url.to_string(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))?;

        // Verify connectivity up front so misconfiguration fails at startup.
        pool.get()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect: {}", e)))?;

        info!(url = %url, "Connected to AMQP broker");

        Ok(Self { pool, retry })
    }

    /// Get a fresh channel from the pool.
    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("Failed to declare queue: {}", e)))?;
        Ok(())
    }

    async fn try_publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.get_channel().await?;
        Self::declare_queue(&channel, queue).await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        Ok(())
    }

    /// Consumer loop with reconnection; runs until the process exits.
    async fn consume_with_reconnect(
        pool: Pool,
        queue: String,
        handler: Arc<dyn MessageHandler>,
        retry: RetryPolicy,
    ) {
        loop {
            match Self::setup_consumer(&pool, &queue).await {
                Ok(mut consumer) => {
                    info!(queue = %queue, "Consumer connected, processing messages");

                    while let Some(delivery) = consumer.next().await {
                        let delivery = match delivery {
                            Ok(d) => d,
                            Err(e) => {
                                error!(queue = %queue, error = %e, "Consumer delivery error, will reconnect");
                                break;
                            }
                        };

                        match deliver_with_retry(&handler, &queue, &delivery.data, &retry).await {
                            Ok(()) => {
                                if let Err(e) = delivery.ack(Default::default()).await {
                                    error!(queue = %queue, error = %e, "Failed to ack message");
                                }
                            }
                            Err(_) => {
                                // Retries exhausted; hand the message to the
                                // broker's dead-letter handling.
                                let nack = BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                };
                                if let Err(e) = delivery.nack(nack).await {
                                    error!(queue = %queue, error = %e, "Failed to nack message");
                                }
                            }
                        }
                    }

                    info!(queue = %queue, "Consumer stream ended, reconnecting");
                }
                Err(e) => {
                    error!(queue = %queue, error = %e, "Failed to set up consumer, retrying");
                }
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn setup_consumer(pool: &Pool, queue: &str) -> Result<lapin::Consumer> {
        let conn = pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))?;

        Self::declare_queue(&channel, queue).await?;

        // One unacked message at a time; retries happen per message.
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to set QoS: {}", e)))?;

        let consumer = channel
            .basic_consume(
                queue,
                "loan-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        Ok(consumer)
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let mut last_err = None;

        for (attempt, delay) in self.retry.delays().enumerate() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.try_publish(queue, &payload).await {
                Ok(()) => {
                    if attempt > 0 {
                        debug!(queue = %queue, attempt = attempt + 1, "Publish succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        queue = %queue,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts(),
                        error = %err,
                        "Publish attempt failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| BusError::Publish("no attempts made".to_string())))
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let pool = self.pool.clone();
        let retry = self.retry.clone();
        let queue = queue.to_string();

        tokio::spawn(async move {
            Self::consume_with_reconnect(pool, queue, handler, retry).await;
        });

        Ok(())
    }
}
