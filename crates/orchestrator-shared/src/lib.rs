//! # orchestrator-shared
//!
//! Cross-cutting infrastructure shared by `orchestrator-core` and
//! `orchestrator-api`: the Bus Port (C1), resilience primitives, layered
//! configuration, error types, redaction, and logging setup. Carries no
//! domain knowledge of requests, workflows, or steps.

pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod redaction;
pub mod resilience;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, SharedResult};
