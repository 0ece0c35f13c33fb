//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{ErrorResponse, MetricDetail, MetricRecord, StateResponse};

/// Returns the scenario, the fleet report and the replication outcome.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let s = &state.summary;
    Json(StateResponse {
        config: state.config.clone(),
        report: s.report.clone(),
        policy: s.plan.policy,
        mean_time_to_sleep_secs: s.plan.mean_time_to_sleep(),
        tuned_per_computer: !s.plan.per_computer.is_empty(),
        runs: s.runs,
        discarded: s.discarded,
        energy_kwh: s.energy_kwh,
        satisfaction_pct: s.satisfaction_pct,
        converged: s.converged,
    })
}

/// Returns one summary row per metric, in name order.
///
/// `GET /stats` → 200 + `Vec<MetricRecord>` JSON
pub async fn list_stats(State(state): State<Arc<AppState>>) -> Json<Vec<MetricRecord>> {
    Json(
        state
            .snapshot
            .metrics
            .iter()
            .map(|(name, acc)| MetricRecord::new(name, acc))
            .collect(),
    )
}

/// Returns a single metric with its histogram bins.
///
/// `GET /stats/{metric}` → 200 + `MetricDetail` JSON
/// unknown metric → 404 + `ErrorResponse`
pub async fn get_metric(
    State(state): State<Arc<AppState>>,
    Path(metric): Path<String>,
) -> Result<Json<MetricDetail>, (StatusCode, Json<ErrorResponse>)> {
    match state.snapshot.get(&metric) {
        Some(acc) => Ok(Json(MetricDetail::new(&metric, acc))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown metric \"{metric}\""),
            }),
        )),
    }
}
