//! # Bus Port (C1)
//!
//! The single seam between the orchestration core and whatever message bus
//! actually carries task dispatch and worker responses. Everything above
//! this module talks in terms of `publish`/`subscribe`/`start_consumer` and
//! never touches `MessagingBackend` directly.

use crate::error::{OrchestratorError, SharedResult};
use crate::messaging::message::{BusMessage, MessageHeaders};
use crate::messaging::provider::MessagingBackend;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A handler invoked for every message delivered on a subscribed topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, body: serde_json::Value);
}

/// The Bus Port: wraps a [`MessagingBackend`] with subscription bookkeeping,
/// the publish failure model, and the consumer-loop lifecycle described in
/// spec §4.1.
pub struct BusPort {
    service_name: String,
    backend: MessagingBackend,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
    started: AtomicBool,
    reconnect_interval: Duration,
    circuit_breaker: CircuitBreaker,
}

impl std::fmt::Debug for BusPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusPort")
            .field("service_name", &self.service_name)
            .field("backend", &self.backend.provider_name())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl BusPort {
    pub fn new(service_name: impl Into<String>, backend: MessagingBackend) -> Self {
        Self::with_circuit_breaker_config(service_name, backend, CircuitBreakerConfig::default())
    }

    pub fn with_circuit_breaker_config(
        service_name: impl Into<String>,
        backend: MessagingBackend,
        circuit_breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            backend,
            handlers: DashMap::new(),
            started: AtomicBool::new(false),
            reconnect_interval: Duration::from_secs(10),
            circuit_breaker: CircuitBreaker::new("bus.messaging".to_string(), circuit_breaker_config),
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Current state of the messaging circuit breaker, for `/health`.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Subscribe directly to the backend's raw byte stream for a topic,
    /// bypassing the handler registry and the `started` gate. Exists for
    /// test harnesses and worker simulators that need to observe or inject
    /// traffic on a topic without registering as a first-class consumer.
    pub fn raw_subscribe(&self, topic: &str) -> tokio::sync::broadcast::Receiver<Vec<u8>> {
        self.backend.subscribe(topic)
    }

    /// Connect once. If the backend fails to connect (connection-refused
    /// class failure), spawn a background loop retrying every
    /// `reconnect_interval` rather than failing startup (spec §4.1: the
    /// port reports "not connected" without crashing the process).
    pub async fn connect(self: &Arc<Self>) -> SharedResult<()> {
        if self.backend.connect().await.is_ok() {
            return Ok(());
        }
        tracing::warn!(
            service = %self.service_name,
            "bus port failed initial connect, entering reconnect loop"
        );
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(this.reconnect_interval).await;
                match this.backend.connect().await {
                    Ok(()) => {
                        tracing::info!(service = %this.service_name, "bus port reconnected");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(service = %this.service_name, "bus port reconnect attempt failed");
                    }
                }
            }
        });
        Ok(())
    }

    /// Publish a JSON body with the standard header set attached.
    ///
    /// Returns `NotConnected` only when the backend has never established
    /// a connection. A network failure on an already-connected producer is
    /// logged and swallowed: the scheduler treats non-delivery as
    /// retryable at the dispatch layer, not at the bus layer (spec §4.1).
    pub async fn publish(
        &self,
        topic: &str,
        body: serde_json::Value,
        headers: MessageHeaders,
    ) -> SharedResult<()> {
        if !self.backend.is_connected() {
            return Err(OrchestratorError::NotConnected);
        }
        if !self.circuit_breaker.should_allow() {
            return Err(OrchestratorError::circuit_breaker_open("bus.messaging"));
        }
        let message = BusMessage::new(headers, body);
        let started = Instant::now();
        let result = self.backend.publish(topic, &message).await;
        match &result {
            Ok(()) => self.circuit_breaker.record_success_manual(started.elapsed()),
            Err(_) => self.circuit_breaker.record_failure_manual(started.elapsed()),
        }
        result
    }

    /// Build the standard header set for an outbound record.
    pub fn headers(&self, timestamp_ms: i64) -> MessageHeaders {
        MessageHeaders::new(self.service_name.clone(), timestamp_ms)
    }

    /// Register a handler for `topic`. Must be called before
    /// [`BusPort::start_consumer`]; calling it afterward returns
    /// `LateSubscribe` since the consumer loop has already been wired up
    /// for the initial subscription set (spec §9: eager start after all
    /// initial subscriptions).
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> SharedResult<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(OrchestratorError::LateSubscribe {
                topic: topic.to_string(),
            });
        }
        if self.handlers.contains_key(topic) {
            return Err(OrchestratorError::AlreadySubscribed {
                topic: topic.to_string(),
            });
        }
        self.handlers.insert(topic.to_string(), handler);
        Ok(())
    }

    /// Start the consumer loop for every topic subscribed so far. Spawns
    /// one dispatch task per topic. Messages that fail to decode as JSON
    /// are logged and considered acknowledged rather than retried: a
    /// decode failure is a bug, not a transient fault (spec §4.1).
    pub fn start_consumer(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for entry in self.handlers.iter() {
            let topic = entry.key().clone();
            let handler = Arc::clone(entry.value());
            let mut rx = self.backend.subscribe(&topic);
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(bytes) => match serde_json::from_slice::<BusMessage>(&bytes) {
                            Ok(message) => handler.handle(&topic, message.body).await,
                            Err(error) => {
                                tracing::warn!(topic = %topic, %error, "dropping undecodable bus message");
                            }
                        },
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(topic = %topic, skipped, "consumer lagged, messages dropped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _topic: &str, _body: serde_json::Value) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_without_connect_is_not_connected() {
        let port = Arc::new(BusPort::new("orchestrator", MessagingBackend::in_memory()));
        // in-memory backend reports connected without an explicit connect()
        // call, matching a production bus where the port starts eager.
        port.connect().await.unwrap();
        let result = port
            .publish("tasks.llm", serde_json::json!({"ok": true}), port.headers(0))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_rejected() {
        let port = Arc::new(BusPort::new("orchestrator", MessagingBackend::in_memory()));
        let count = Arc::new(AtomicUsize::new(0));
        port.subscribe(
            "job.responses.llm",
            Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }),
        )
        .unwrap();
        let err = port
            .subscribe(
                "job.responses.llm",
                Arc::new(CountingHandler {
                    count: Arc::clone(&count),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadySubscribed { .. }));
    }

    #[tokio::test]
    async fn subscribe_after_start_is_late() {
        let port = Arc::new(BusPort::new("orchestrator", MessagingBackend::in_memory()));
        port.start_consumer();
        let err = port
            .subscribe(
                "job.responses.llm",
                Arc::new(CountingHandler {
                    count: Arc::new(AtomicUsize::new(0)),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::LateSubscribe { .. }));
    }

    #[tokio::test]
    async fn published_message_reaches_subscribed_handler() {
        let port = Arc::new(BusPort::new("orchestrator", MessagingBackend::in_memory()));
        port.connect().await.unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        port.subscribe(
            "job.responses.llm",
            Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }),
        )
        .unwrap();
        port.start_consumer();
        port.publish(
            "job.responses.llm",
            serde_json::json!({"assignment_id": "a1"}),
            port.headers(0),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_message_is_dropped_not_retried() {
        let port = Arc::new(BusPort::new("orchestrator", MessagingBackend::in_memory()));
        port.connect().await.unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        port.subscribe(
            "job.responses.llm",
            Arc::new(CountingHandler {
                count: Arc::clone(&count),
            }),
        )
        .unwrap();
        port.start_consumer();

        let MessagingBackend::InMemory(backend) = &port.backend else {
            unreachable!("test port always uses the in-memory backend")
        };
        backend.publish_raw("job.responses.llm", b"not json".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        port.publish(
            "job.responses.llm",
            serde_json::json!({"assignment_id": "a2"}),
            port.headers(0),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
