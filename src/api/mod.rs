//! REST API over the results of a finished experiment.
//!
//! Provides three GET endpoints:
//! - `/state` for the scenario, the fleet report and the replication summary
//! - `/stats` for one summary row per metric
//! - `/stats/{metric}` for one metric including its histogram bins

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::config::ScenarioConfig;
use crate::runner::ReplicationSummary;
use crate::stats::StatsSnapshot;

pub use types::{BinRecord, ErrorResponse, MetricDetail, MetricRecord, StateResponse};

/// Read-only state shared by all request handlers.
///
/// Built once after the replications complete; nothing is mutated while
/// serving, so no locks are needed.
pub struct AppState {
    /// Scenario the experiment ran.
    pub config: ScenarioConfig,
    /// Aggregate outcome of the replications.
    pub summary: ReplicationSummary,
    /// Merged stats, frozen at construction.
    pub snapshot: StatsSnapshot,
}

impl AppState {
    pub fn new(config: ScenarioConfig, summary: ReplicationSummary) -> Self {
        let snapshot = summary.snapshot();
        Self {
            config,
            summary,
            snapshot,
        }
    }
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/stats", get(handlers::list_stats))
        .route("/stats/{metric}", get(handlers::get_metric))
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `addr` - Socket address to bind to
///
/// # Errors
///
/// Returns the I/O error if the listener cannot bind to `addr` or the
/// server stops abnormally.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
