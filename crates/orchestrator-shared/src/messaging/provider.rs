//! # Messaging Backend
//!
//! Enum-dispatched backend for the Bus Port — no trait objects, matching
//! the reference architecture's `MessagingProvider` pattern. Two variants:
//! an in-memory loopback used by every test in this workspace (and
//! available in production for single-process deployments), and an AMQP
//! backend for a real topic-exchange broker.

use crate::error::{OrchestratorError, SharedResult};
use crate::messaging::message::BusMessage;
use dashmap::DashMap;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const TOPIC_EXCHANGE: &str = "orchestrator.tasks";

/// Enum-dispatched messaging backend.
#[derive(Clone)]
pub enum MessagingBackend {
    InMemory(Arc<InMemoryBackend>),
    Amqp(Arc<AmqpBackend>),
}

impl std::fmt::Debug for MessagingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory(_) => write!(f, "MessagingBackend::InMemory"),
            Self::Amqp(_) => write!(f, "MessagingBackend::Amqp"),
        }
    }
}

impl MessagingBackend {
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryBackend::new()))
    }

    pub fn amqp(brokers: String) -> Self {
        Self::Amqp(Arc::new(AmqpBackend::new(brokers)))
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in_memory",
            Self::Amqp(_) => "amqp",
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::InMemory(_) => true,
            Self::Amqp(backend) => backend.is_connected(),
        }
    }

    pub async fn publish(&self, topic: &str, message: &BusMessage) -> SharedResult<()> {
        match self {
            Self::InMemory(backend) => backend.publish(topic, message),
            Self::Amqp(backend) => backend.publish(topic, message).await,
        }
    }

    /// Subscribe a raw byte channel to a topic; the Bus Port decodes and
    /// dispatches. Returns a receiver that yields every message published
    /// to `topic` from the moment of subscription onward.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        match self {
            Self::InMemory(backend) => backend.subscribe(topic),
            Self::Amqp(backend) => backend.subscribe(topic),
        }
    }

    pub async fn connect(&self) -> SharedResult<()> {
        match self {
            Self::InMemory(_) => Ok(()),
            Self::Amqp(backend) => backend.connect().await,
        }
    }
}

/// In-memory loopback backend: publish fans out to every subscriber's
/// broadcast channel. Always reports connected.
pub struct InMemoryBackend {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl InMemoryBackend {
    fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }

    fn publish(&self, topic: &str, message: &BusMessage) -> SharedResult<()> {
        let bytes = serde_json::to_vec(message)?;
        // A broadcast send with no receivers is not an error: the Bus Port
        // spec treats "not delivered" as retryable, never fatal.
        let _ = self.sender_for(topic).send(bytes);
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender_for(topic).subscribe()
    }

    /// Push raw bytes onto a topic, bypassing JSON envelope construction.
    /// Exists only so tests can exercise the Bus Port's decode-failure path.
    #[cfg(test)]
    pub(crate) fn publish_raw(&self, topic: &str, bytes: Vec<u8>) {
        let _ = self.sender_for(topic).send(bytes);
    }
}

/// AMQP-backed messaging: a topic exchange with one queue per subscribed
/// routing key, giving competing-consumer ("consumer group") semantics
/// when multiple orchestrator processes bind the same queue name.
pub struct AmqpBackend {
    brokers: String,
    connected: AtomicBool,
    inner: Mutex<Option<AmqpConnection>>,
}

struct AmqpConnection {
    #[allow(dead_code)]
    connection: Connection,
    channel: Channel,
}

impl AmqpBackend {
    fn new(brokers: String) -> Self {
        Self {
            brokers,
            connected: AtomicBool::new(false),
            inner: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Attempt the initial connection. Connection-refused-class failures
    /// are not fatal: the caller (Bus Port) schedules a 10s retry loop and
    /// treats the port as "not connected" in the meantime (spec §4.1).
    pub async fn connect(&self) -> SharedResult<()> {
        let addr = format!("amqp://{}/%2f", self.brokers);
        match Connection::connect(&addr, ConnectionProperties::default()).await {
            Ok(connection) => {
                let channel = connection
                    .create_channel()
                    .await
                    .map_err(|e| OrchestratorError::config(e.to_string()))?;
                channel
                    .exchange_declare(
                        TOPIC_EXCHANGE,
                        ExchangeKind::Topic,
                        ExchangeDeclareOptions {
                            durable: true,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(|e| OrchestratorError::config(e.to_string()))?;
                *self.inner.lock().await = Some(AmqpConnection { connection, channel });
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Err(_) => {
                self.connected.store(false, Ordering::Release);
                Err(OrchestratorError::NotConnected)
            }
        }
    }

    async fn publish(&self, topic: &str, message: &BusMessage) -> SharedResult<()> {
        let guard = self.inner.lock().await;
        let Some(conn) = guard.as_ref() else {
            tracing::warn!(topic, "bus publish attempted while not connected; dropping");
            return Ok(());
        };
        let bytes = serde_json::to_vec(message)?;
        if let Err(e) = conn
            .channel
            .basic_publish(
                TOPIC_EXCHANGE,
                topic,
                BasicPublishOptions::default(),
                &bytes,
                BasicProperties::default(),
            )
            .await
        {
            tracing::warn!(topic, error = %e, "bus publish failed; treated as retryable dispatch");
        }
        Ok(())
    }

    /// Declare and bind a queue for `topic`, returning a broadcast receiver
    /// fed by a background consumer task. Kept as a broadcast channel (not
    /// a raw lapin consumer) so the Bus Port's dispatch loop is identical
    /// across backends.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        let (tx, rx) = broadcast::channel(1024);
        let topic = topic.to_string();
        let inner = self.inner.try_lock();
        if let Ok(guard) = inner {
            if let Some(conn) = guard.as_ref() {
                let channel = conn.channel.clone();
                let queue_name = format!("orchestrator.{topic}");
                tokio::spawn(async move {
                    if let Err(e) = bind_and_consume(channel, queue_name, topic, tx).await {
                        tracing::error!(error = %e, "amqp consumer task exited");
                    }
                });
            }
        }
        rx
    }
}

async fn bind_and_consume(
    channel: Channel,
    queue_name: String,
    topic: String,
    tx: broadcast::Sender<Vec<u8>>,
) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &queue_name,
            TOPIC_EXCHANGE,
            &topic,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    use futures::StreamExt;
    let mut consumer = channel
        .basic_consume(
            &queue_name,
            "orchestrator",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        if let Ok(delivery) = delivery {
            let _ = tx.send(delivery.data.clone());
            let _ = delivery.ack(lapin::options::BasicAckOptions::default()).await;
        }
    }
    Ok(())
}
