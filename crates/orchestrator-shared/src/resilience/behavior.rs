//! # Circuit Breaker Behavior Trait
//!
//! Defines the `CircuitBreakerBehavior` trait that unifies every circuit
//! breaker in the system (messaging, worker registry discovery, dispatch).
//! Each specialized breaker wraps the generic [`crate::resilience::CircuitBreaker`]
//! while retaining its own domain-specific convenience methods.
//!
//! The trait is object-safe so consumers can work with
//! `&dyn CircuitBreakerBehavior` when uniform access to any breaker is
//! needed (health reporting, metrics collection); concrete types are
//! preferred in hot paths for zero-cost dispatch.

use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use std::time::Duration;

/// Unified interface for all circuit breaker implementations.
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    /// Name of the component this circuit breaker protects.
    fn name(&self) -> &str;

    /// Current circuit state.
    fn state(&self) -> CircuitState;

    /// Whether the circuit currently allows the next call.
    fn should_allow(&self) -> bool;

    /// Record a successful operation with its duration.
    fn record_success(&self, duration: Duration);

    /// Record a failed operation with its duration.
    fn record_failure(&self, duration: Duration);

    /// Whether the circuit breaker considers the component healthy.
    fn is_healthy(&self) -> bool;

    /// Force the circuit open (emergency kill switch).
    fn force_open(&self);

    /// Force the circuit closed (emergency recovery).
    fn force_closed(&self);

    /// Metrics snapshot for observability.
    fn metrics(&self) -> CircuitBreakerMetrics;
}
