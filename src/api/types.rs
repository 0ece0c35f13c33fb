//! API response types.
//!
//! Metric rows use the same column names as the stats CSV export.

use serde::Serialize;

use crate::config::ScenarioConfig;
use crate::runner::ConfidenceInterval;
use crate::sim::policy::PowerPolicy;
use crate::stats::{Accumulator, RunReport};

/// Scenario, headline report and replication outcome.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub config: ScenarioConfig,
    pub report: RunReport,
    /// Timeouts actually simulated, after any tuning.
    pub policy: PowerPolicy,
    /// Time-to-sleep averaged over computers and hours of the week.
    pub mean_time_to_sleep_secs: f64,
    /// Each computer slept on its own per-hour timeouts.
    pub tuned_per_computer: bool,
    pub runs: usize,
    pub discarded: usize,
    /// Energy per computer per run (kWh).
    pub energy_kwh: ConfidenceInterval,
    pub satisfaction_pct: ConfidenceInterval,
    pub converged: bool,
}

/// Summary of one metric.
///
/// `mean`, `min` and `max` are `null` for a metric without samples.
#[derive(Debug, Serialize)]
pub struct MetricRecord {
    pub metric: String,
    pub count: u64,
    pub sum: f64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MetricRecord {
    pub fn new(name: &str, acc: &Accumulator) -> Self {
        Self {
            metric: name.to_string(),
            count: acc.count(),
            sum: acc.sum(),
            mean: acc.mean(),
            min: acc.min(),
            max: acc.max(),
        }
    }
}

/// One histogram bin. An unbounded last bin has `upper: null`.
#[derive(Debug, Serialize)]
pub struct BinRecord {
    pub lower: f64,
    pub upper: Option<f64>,
    pub count: u64,
}

/// Summary of one metric plus its histogram, if it has one.
#[derive(Debug, Serialize)]
pub struct MetricDetail {
    #[serde(flatten)]
    pub summary: MetricRecord,
    /// Empty for metrics without a histogram.
    pub bins: Vec<BinRecord>,
    pub underflow: u64,
    pub overflow: u64,
}

impl MetricDetail {
    pub fn new(name: &str, acc: &Accumulator) -> Self {
        let (bins, underflow, overflow) = match acc.histogram() {
            Some(h) => (
                h.bins()
                    .map(|(lower, upper, count)| BinRecord {
                        lower,
                        upper: upper.is_finite().then_some(upper),
                        count,
                    })
                    .collect(),
                h.underflow(),
                h.overflow(),
            ),
            None => (Vec::new(), 0, 0),
        };
        Self {
            summary: MetricRecord::new(name, acc),
            bins,
            underflow,
            overflow,
        }
    }
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
