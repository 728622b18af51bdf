//! # Shared App State
//!
//! The single piece of state every axum handler closes over: a handle to
//! the running [`OrchestrationCore`]. Cloning `AppState` only clones the
//! `Arc`, matching axum's `State` extractor conventions.

use orchestrator_core::OrchestrationCore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<OrchestrationCore>,
}

impl AppState {
    pub fn new(core: Arc<OrchestrationCore>) -> Self {
        Self { core }
    }
}
