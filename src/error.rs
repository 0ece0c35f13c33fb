//! Error types for distribution construction, scheduling, aggregation and
//! trace loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::sim::event::AgentId;

/// Malformed or empty input while constructing a [`Distribution`](crate::dist::Distribution).
///
/// Always raised before the event loop starts; sampling a constructed
/// distribution never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidDistributionError {
    #[error("invalid distribution: data set is empty")]
    Empty,

    #[error("invalid distribution: data contains non-finite values")]
    NonFinite,

    #[error("invalid distribution: `{name}` {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid distribution: {children} children but {weights} weights")]
    WeightMismatch { children: usize, weights: usize },
}

/// Attempt to put an event on the queue that violates virtual-time ordering.
///
/// This signals a logic defect in an agent and is never clamped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    #[error("cannot schedule event at t={requested} before current time t={now}")]
    InPast { requested: f64, now: f64 },

    #[error("cannot schedule event at a non-finite time")]
    NonFinite,
}

/// Two [`Stats`](crate::stats::Stats) objects whose shapes differ were merged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IncompatibleAggregationError {
    #[error("incompatible aggregation: metric sets differ (left-only: {left_only:?}, right-only: {right_only:?})")]
    MetricSetMismatch {
        left_only: Vec<String>,
        right_only: Vec<String>,
    },

    #[error("incompatible aggregation: histogram bin edges differ")]
    HistogramEdges,

    #[error("incompatible aggregation: histogram edges differ for `{metric}`")]
    EdgeMismatch { metric: String },

    #[error("incompatible aggregation: `{metric}` has a histogram on one side only")]
    HistogramPresence { metric: String },
}

/// Failure while loading the historical usage trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("cannot read trace \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed trace: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed trace: unknown day \"{0}\"")]
    UnknownDay(String),

    #[error("malformed trace: hour \"{0}\" is not in 0..24")]
    InvalidHour(String),

    #[error("malformed trace: computer \"{0}\" appears more than once for {1}")]
    DuplicateComputer(String, String),

    #[error("trace contains no computer with complete activity data")]
    NoUsableComputers,

    #[error(transparent)]
    Distribution(#[from] InvalidDistributionError),
}

/// Top-level error returned by simulation setup and execution.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Distribution(#[from] InvalidDistributionError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Aggregation(#[from] IncompatibleAggregationError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("event addressed to unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error("agent {0} is not a computer")]
    NotAComputer(AgentId),

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("no runs completed")]
    NoRuns,
}
