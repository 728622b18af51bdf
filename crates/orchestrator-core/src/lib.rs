//! # orchestrator-core
//!
//! The workflow orchestration engine: domain model, Request Store, Worker
//! Registry, Workflow Catalog, Router, Scheduler, Response Correlator, and
//! result aggregation. Depends on `orchestrator-shared` for the Bus Port,
//! resilience, configuration, and error infrastructure; owns every piece
//! of domain knowledge about requests, workflows, and steps.

pub mod aggregation;
pub mod bootstrap;
pub mod catalog;
pub mod correlator;
pub mod error;
pub mod model;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod store;

pub use bootstrap::{Admission, OrchestrationCore, RequestView};
pub use error::{CoreError, CoreResult};
