//! # Router Assembly & Serving
//!
//! Builds the full axum [`Router`] (spec §4.8 routes plus `/health`) and
//! serves it with tower-http's cors/timeout/trace middleware, mirroring the
//! reference stack's `tower = { features = ["cors", "timeout", "trace"] }`
//! dependency.

use crate::health::health_check;
use crate::routes;
use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Assemble the full router. `/health` is unauthenticated and added last so
/// it never picks up the auth extractor applied to the other routes (the
/// extractor is per-handler here, not a route-layer, so no ordering
/// subtlety beyond readability).
pub fn build_router(state: AppState) -> Router {
    routes::router()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "orchestration api listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
