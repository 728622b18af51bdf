//! # Health Endpoint
//!
//! `GET /health` (spec §9 ambient observability): reports bus connectivity,
//! and the state of every circuit breaker guarding an outbound call, for
//! liveness/readiness probes. Never requires auth.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use orchestrator_shared::resilience::CircuitState;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub bus_connected: bool,
    pub circuit_breakers: Vec<BreakerStatus>,
}

#[derive(Debug, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let bus_connected = state.core.bus.is_connected();

    let mut circuit_breakers = vec![BreakerStatus {
        name: state.core.bus.circuit_breaker().name().to_string(),
        state: state.core.bus.circuit_breaker().state(),
    }];
    if let Some(breaker) = state.core.registry.discovery_circuit_breaker() {
        circuit_breakers.push(BreakerStatus {
            name: breaker.name().to_string(),
            state: breaker.state(),
        });
    }
    circuit_breakers.push(BreakerStatus {
        name: state.core.scheduler.dispatch_breaker().name().to_string(),
        state: state.core.scheduler.dispatch_breaker().state(),
    });

    let healthy = bus_connected && circuit_breakers.iter().all(|b| b.state != CircuitState::Open);
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "degraded" },
            bus_connected,
            circuit_breakers,
        }),
    )
}
