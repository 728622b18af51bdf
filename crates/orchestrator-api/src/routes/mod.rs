//! Route handlers for the Orchestration API (spec §4.8).

mod orchestrate;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orchestrate", post(orchestrate::admit))
        .route("/orchestrate/{id}", get(orchestrate::get_request))
}
