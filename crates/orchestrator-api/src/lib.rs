//! # orchestrator-api
//!
//! The Orchestration API (C8): the only HTTP surface the core exposes.
//! `POST /orchestrate` admits a request; `GET /orchestrate/{id}` reads its
//! current view; `GET /health` reports bus/store/circuit-breaker
//! reachability for liveness/readiness probes. Everything named a
//! Non-goal in spec §1 — auth/JWT validation, rate limiting, synchronous
//! proxies to individual workers, Swagger generation — stays out of this
//! crate; it assumes an upstream gateway already did that work and handed
//! it a resolved `user_id`.

pub mod auth;
pub mod dto;
pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_router, serve};
pub use state::AppState;
