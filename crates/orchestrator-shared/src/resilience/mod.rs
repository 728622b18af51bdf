//! # Resilience
//!
//! Generic circuit breaker used to protect the Bus Port, the worker
//! registry's cluster-discovery calls, and step dispatch from cascading
//! failures. A single `CircuitBreaker` implementation backs every
//! specialized breaker in the system via composition, following the
//! `CircuitBreakerBehavior` trait.

mod behavior;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use metrics::CircuitBreakerMetrics;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Circuit breaker state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

/// Configuration for a single circuit breaker instance.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures needed to trip the circuit open.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a half-open probe.
    pub timeout: Duration,
    /// Consecutive successes in half-open needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Global settings shared across every circuit breaker instance in the
/// process (used for metrics collection cadence, not per-breaker behavior).
#[derive(Debug, Clone)]
pub struct GlobalCircuitBreakerSettings {
    pub max_circuit_breakers: usize,
    pub metrics_collection_interval: Duration,
    pub min_state_transition_interval: Duration,
}

/// Generic, thread-safe circuit breaker.
///
/// Closed → Open on `failure_threshold` consecutive failures. Open → HalfOpen
/// once `timeout` has elapsed since the trip (checked lazily on
/// `should_allow`). HalfOpen → Closed on `success_threshold` consecutive
/// successes; any failure in HalfOpen reopens immediately.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    half_open_calls: AtomicU64,
    total_duration_micros: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            circuit_breaker = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            timeout_secs = config.timeout.as_secs(),
            "circuit breaker initialized"
        );
        Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            half_open_calls: AtomicU64::new(0),
            total_duration_micros: AtomicU64::new(0),
            opened_at: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: CircuitState) {
        let old = self.state();
        if old == new_state {
            return;
        }
        self.state.store(new_state.as_u8(), Ordering::Release);
        if new_state == CircuitState::Open {
            *self.opened_at.lock().expect("opened_at mutex poisoned") = Some(Instant::now());
        }
        if new_state == CircuitState::Closed {
            self.consecutive_failures.store(0, Ordering::Release);
            self.half_open_successes.store(0, Ordering::Release);
        }
        info!(
            circuit_breaker = %self.name,
            from = ?old,
            to = ?new_state,
            "circuit breaker state transition"
        );
    }

    /// Check whether a call is currently allowed, transitioning Open →
    /// HalfOpen if the recovery timeout has elapsed.
    pub fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .expect("opened_at mutex poisoned")
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    self.set_state(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success_manual(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.set_state(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.set_state(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.set_state(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn force_open(&self) {
        self.set_state(CircuitState::Open);
    }

    pub fn force_closed(&self) {
        self.set_state(CircuitState::Closed);
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration = Duration::from_micros(self.total_duration_micros.load(Ordering::Relaxed));
        let failure_rate = if total_calls > 0 {
            failure_count as f64 / total_calls as f64
        } else {
            0.0
        };
        let success_rate = if total_calls > 0 {
            success_count as f64 / total_calls as f64
        } else {
            0.0
        };
        let average_duration = if total_calls > 0 {
            total_duration / total_calls as u32
        } else {
            Duration::ZERO
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed) as u64,
            half_open_calls: self.half_open_calls.load(Ordering::Relaxed),
            total_duration,
            current_state: self.state(),
            failure_rate,
            success_rate,
            average_duration,
        }
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        self.name()
    }

    fn state(&self) -> CircuitState {
        CircuitBreaker::state(self)
    }

    fn should_allow(&self) -> bool {
        CircuitBreaker::should_allow(self)
    }

    fn record_success(&self, duration: Duration) {
        self.record_success_manual(duration);
    }

    fn record_failure(&self, duration: Duration) {
        self.record_failure_manual(duration);
    }

    fn is_healthy(&self) -> bool {
        CircuitBreaker::is_healthy(self)
    }

    fn force_open(&self) {
        CircuitBreaker::force_open(self);
    }

    fn force_closed(&self) {
        CircuitBreaker::force_closed(self);
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreaker::metrics(self)
    }
}
