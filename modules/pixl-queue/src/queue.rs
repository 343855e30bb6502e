//! Durable AMQP work queues (§4.2): at-least-once delivery, manual ack,
//! opaque byte-sequence payloads decoded by the caller.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
    QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer as LapinConsumer};
use tracing::debug;

use crate::error::Result;

async fn connect(amqp_url: &str) -> Result<Connection> {
    Ok(Connection::connect(amqp_url, ConnectionProperties::default()).await?)
}

async fn declared_channel(conn: &Connection, queue_name: &str) -> Result<Channel> {
    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(channel)
}

/// Publishes batches of opaque messages to one durable queue.
pub struct Producer {
    channel: Channel,
    queue_name: String,
}

impl Producer {
    pub async fn connect(amqp_url: &str, queue_name: impl Into<String>) -> Result<Self> {
        let queue_name = queue_name.into();
        let conn = connect(amqp_url).await?;
        let channel = declared_channel(&conn, &queue_name).await?;
        Ok(Self { channel, queue_name })
    }

    /// Publish a batch of messages. A no-op if `messages` is empty.
    pub async fn publish(&self, messages: &[Vec<u8>]) -> Result<()> {
        if messages.is_empty() {
            debug!(queue = %self.queue_name, "nothing to publish");
            return Ok(());
        }
        for msg in messages {
            self.channel
                .basic_publish(
                    "",
                    &self.queue_name,
                    BasicPublishOptions::default(),
                    msg,
                    BasicProperties::default().with_delivery_mode(2),
                )
                .await?
                .await?;
        }
        debug!(queue = %self.queue_name, count = messages.len(), "published");
        Ok(())
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.channel
            .queue_purge(&self.queue_name, QueuePurgeOptions::default())
            .await?;
        Ok(())
    }
}

/// A cloneable handle for acknowledging deliveries pulled by a
/// `WorkConsumer`, usable from the worker tasks the receiver hands off to.
#[derive(Clone)]
pub struct AckHandle {
    channel: Channel,
}

impl AckHandle {
    pub async fn ack(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    pub async fn requeue(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_reject(delivery.delivery_tag, BasicRejectOptions { requeue: true })
            .await?;
        Ok(())
    }

    pub async fn discard(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_reject(delivery.delivery_tag, BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }
}

/// Consumes one durable queue with manual acknowledgement.
pub struct WorkConsumer {
    channel: Channel,
    queue_name: String,
    consumer: LapinConsumer,
}

impl WorkConsumer {
    pub async fn connect(amqp_url: &str, queue_name: impl Into<String>) -> Result<Self> {
        let queue_name = queue_name.into();
        let conn = connect(amqp_url).await?;
        let channel = declared_channel(&conn, &queue_name).await?;
        let consumer = channel
            .basic_consume(
                &queue_name,
                "pixl-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(Self {
            channel,
            queue_name,
            consumer,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// A cheaply-cloneable handle for acking/requeuing/discarding from a
    /// spawned worker task, independent of the receiver's delivery stream
    /// (§9: one receiver task hands off to bounded worker tasks).
    pub fn ack_handle(&self) -> AckHandle {
        AckHandle {
            channel: self.channel.clone(),
        }
    }

    /// Wait for the next delivery, returning `None` if none arrives within
    /// `timeout`.
    pub async fn next(&mut self, timeout: Duration) -> Result<Option<lapin::message::Delivery>> {
        use futures::StreamExt;
        match tokio::time::timeout(timeout, self.consumer.next()).await {
            Ok(Some(delivery)) => Ok(Some(delivery?)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    pub async fn ack(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    pub async fn requeue(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_reject(
                delivery.delivery_tag,
                BasicRejectOptions { requeue: true },
            )
            .await?;
        Ok(())
    }

    pub async fn discard(&self, delivery: &lapin::message::Delivery) -> Result<()> {
        self.channel
            .basic_reject(
                delivery.delivery_tag,
                BasicRejectOptions { requeue: false },
            )
            .await?;
        Ok(())
    }

    /// Drain every message currently on the queue to `path`, one per line,
    /// auto-acking as it goes. Stops once `idle_timeout` passes with
    /// nothing arriving — the *stop* path used to checkpoint a paused run.
    /// Restart reads this file back instead of the upstream cohort.
    pub async fn drain_to_file(&mut self, path: &Path, idle_timeout: Duration) -> Result<usize> {
        let mut file = std::fs::File::create(path)?;
        let mut count = 0usize;
        loop {
            match self.next(idle_timeout).await? {
                Some(delivery) => {
                    writeln!(file, "{}", String::from_utf8_lossy(&delivery.data))?;
                    self.ack(&delivery).await?;
                    count += 1;
                }
                None => break,
            }
        }
        debug!(queue = %self.queue_name, count, path = %path.display(), "drained to checkpoint file");
        Ok(count)
    }
}

/// Load a checkpoint file written by `drain_to_file`, one message per line.
/// Restart semantics (§4.2): if this file exists, it replaces the upstream
/// cohort as the message source.
pub fn load_checkpoint(path: &Path) -> Result<Vec<Vec<u8>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(|l| l.as_bytes().to_vec()).collect())
}
