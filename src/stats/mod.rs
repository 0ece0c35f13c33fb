//! Aggregation sinks written by agents during a run.
//!
//! A [`Stats`] maps metric names to running accumulators. Every run of a
//! given configuration registers the same catalogue of metrics up front,
//! which is what lets independent runs be merged for Monte Carlo summaries.

pub mod histogram;
pub mod report;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

pub use histogram::Histogram;
pub use report::{JOULES_PER_KWH, RunReport};

use crate::error::{IncompatibleAggregationError, InvalidDistributionError};

/// Metric names recorded by the simulation.
pub mod metric {
    pub const ENERGY_JOULES: &str = "energy_joules";
    pub const ACTIVE_SECONDS: &str = "active_seconds";
    pub const IDLE_SECONDS: &str = "idle_seconds";
    pub const SLEEP_SECONDS: &str = "sleep_seconds";
    pub const OFF_SECONDS: &str = "off_seconds";
    /// Off periods started by the user, booked when they end.
    pub const USER_SHUTDOWN_SECONDS: &str = "user_shutdown_seconds";
    /// Off periods started by the working-hours schedule.
    pub const AUTO_SHUTDOWN_SECONDS: &str = "auto_shutdown_seconds";
    pub const USER_SHUTDOWNS: &str = "user_shutdowns";
    pub const TRANSITIONS_COUNT: &str = "transitions_count";
    pub const REQUESTS_SERVED: &str = "requests_served";
    pub const REQUESTS_REJECTED: &str = "requests_rejected";
    pub const WAKE_LATENCY_SECONDS: &str = "wake_latency_seconds";
    pub const SERVICE_SECONDS: &str = "service_seconds";
    pub const INACTIVITY_SECONDS: &str = "inactivity_seconds";
    pub const USER_SATISFACTION: &str = "user_satisfaction";

    /// Metrics that carry a duration histogram.
    pub const DURATIONS: &[&str] = &[
        ACTIVE_SECONDS,
        IDLE_SECONDS,
        SLEEP_SECONDS,
        OFF_SECONDS,
        USER_SHUTDOWN_SECONDS,
        AUTO_SHUTDOWN_SECONDS,
        WAKE_LATENCY_SECONDS,
        SERVICE_SECONDS,
        INACTIVITY_SECONDS,
    ];

    /// Metrics summarised without a histogram.
    pub const SCALARS: &[&str] = &[
        ENERGY_JOULES,
        TRANSITIONS_COUNT,
        REQUESTS_SERVED,
        REQUESTS_REJECTED,
        USER_SHUTDOWNS,
        USER_SATISFACTION,
    ];
}

/// Running count, sum and range of one metric, optionally binned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    histogram: Option<Histogram>,
}

impl Accumulator {
    pub fn new(histogram: Option<Histogram>) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            histogram,
        }
    }

    pub fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        if let Some(h) = &mut self.histogram {
            h.insert(value);
        }
    }

    fn merge(&self, other: &Self, name: &str) -> Result<Self, IncompatibleAggregationError> {
        let histogram = match (&self.histogram, &other.histogram) {
            (None, None) => None,
            (Some(a), Some(b)) => Some(a.merge(b).map_err(|_| {
                IncompatibleAggregationError::EdgeMismatch {
                    metric: name.to_string(),
                }
            })?),
            _ => {
                return Err(IncompatibleAggregationError::HistogramPresence {
                    metric: name.to_string(),
                });
            }
        };
        let pick = |a: Option<f64>, b: Option<f64>, f: fn(f64, f64) -> f64| match (a, b) {
            (Some(x), Some(y)) => Some(f(x, y)),
            (x, y) => x.or(y),
        };
        Ok(Self {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            min: pick(self.min, other.min, f64::min),
            max: pick(self.max, other.max, f64::max),
            histogram,
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `None` before the first sample.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }
}

/// Named accumulators owned by one run (or the merge of several).
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    metrics: BTreeMap<String, Accumulator>,
    runs: u64,
}

impl Stats {
    /// Empty sink counting as one run.
    pub fn new() -> Self {
        Self {
            metrics: BTreeMap::new(),
            runs: 1,
        }
    }

    /// Sink with the full simulation catalogue registered, duration metrics
    /// binned over `duration_edges`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if `duration_edges` is not a valid
    /// set of histogram edges.
    pub fn with_catalogue(duration_edges: &[f64]) -> Result<Self, InvalidDistributionError> {
        let template = Histogram::new(duration_edges.to_vec())?;
        let mut stats = Self::new();
        for name in metric::DURATIONS {
            stats.register(name, Some(template.clone()));
        }
        for name in metric::SCALARS {
            stats.register(name, None);
        }
        Ok(stats)
    }

    /// Declares `name` so that it appears in the snapshot even if never
    /// recorded. Re-registering an existing metric is a no-op.
    pub fn register(&mut self, name: &str, histogram: Option<Histogram>) {
        self.metrics
            .entry(name.to_string())
            .or_insert_with(|| Accumulator::new(histogram));
    }

    /// Adds one sample to `name`, registering it without a histogram if it
    /// is new. Non-finite values are dropped.
    pub fn record(&mut self, name: &str, value: f64) {
        if !value.is_finite() {
            warn!(metric = name, value, "dropping non-finite sample");
            return;
        }
        match self.metrics.get_mut(name) {
            Some(acc) => acc.record(value),
            None => {
                let mut acc = Accumulator::new(None);
                acc.record(value);
                self.metrics.insert(name.to_string(), acc);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Accumulator> {
        self.metrics.get(name)
    }

    /// Number of runs folded into this sink.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Read-only copy for persistence and reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs: self.runs,
            metrics: self.metrics.clone(),
        }
    }

    /// Combines two independent sinks.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleAggregationError` if the metric name sets
    /// differ, or a shared metric's histograms have different edges or are
    /// present on only one side.
    pub fn merge(&self, other: &Self) -> Result<Self, IncompatibleAggregationError> {
        let left_only: Vec<String> = self
            .metrics
            .keys()
            .filter(|k| !other.metrics.contains_key(*k))
            .cloned()
            .collect();
        let right_only: Vec<String> = other
            .metrics
            .keys()
            .filter(|k| !self.metrics.contains_key(*k))
            .cloned()
            .collect();
        if !left_only.is_empty() || !right_only.is_empty() {
            return Err(IncompatibleAggregationError::MetricSetMismatch {
                left_only,
                right_only,
            });
        }

        let metrics = self
            .metrics
            .iter()
            .map(|(name, acc)| Ok((name.clone(), acc.merge(&other.metrics[name], name)?)))
            .collect::<Result<BTreeMap<_, _>, IncompatibleAggregationError>>()?;
        Ok(Self {
            metrics,
            runs: self.runs + other.runs,
        })
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of a [`Stats`] handed to persistence and plotting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub runs: u64,
    pub metrics: BTreeMap<String, Accumulator>,
}

impl StatsSnapshot {
    pub fn get(&self, name: &str) -> Option<&Accumulator> {
        self.metrics.get(name)
    }

    /// Sum of `name`, zero if absent.
    pub fn sum(&self, name: &str) -> f64 {
        self.get(name).map_or(0.0, Accumulator::sum)
    }

    /// Sample count of `name`, zero if absent.
    pub fn count(&self, name: &str) -> u64 {
        self.get(name).map_or(0, Accumulator::count)
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}
