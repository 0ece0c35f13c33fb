//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use fleet_power_sim::activity::{ActivityModel, ActivityProfile};
use fleet_power_sim::config::ScenarioConfig;
use fleet_power_sim::dist::Distribution;
use fleet_power_sim::sim::{PowerDraw, PowerPolicy};

/// Histogram edges for duration metrics (one unbounded last bin).
pub const EDGES: &[f64] = &[0.0, 10.0, 60.0, 300.0, 3_600.0, f64::INFINITY];

/// Draw per state: 80 W active, 50 W idle, 3 W asleep, 1 W off.
pub const POWER: PowerDraw = PowerDraw {
    active_w: 80.0,
    idle_w: 50.0,
    sleep_w: 3.0,
    off_w: 1.0,
};

/// Idle after 60 s, asleep 120 s later, instant wake.
pub const QUICK_POLICY: PowerPolicy = PowerPolicy {
    idle_timeout: 60.0,
    sleep_timeout: 120.0,
    wake_latency: 0.0,
};

/// Log-normal activity and inactivity shared by every context.
pub fn office_model() -> Arc<ActivityModel> {
    let activity = Distribution::from_log_normal(45.0, 30.0).unwrap();
    let inactivity = Distribution::from_log_normal(600.0, 900.0).unwrap();
    Arc::new(ActivityModel::uniform(ActivityProfile::new(
        Arc::new(activity),
        Arc::new(inactivity),
    )))
}

/// [`office_model`] whose user switches the computer off once in every hour.
pub fn shutdown_model() -> Arc<ActivityModel> {
    let activity = Distribution::from_log_normal(45.0, 30.0).unwrap();
    let inactivity = Distribution::from_log_normal(600.0, 900.0).unwrap();
    let off = Distribution::from_log_normal(900.0, 300.0).unwrap();
    Arc::new(ActivityModel::uniform(
        ActivityProfile::new(Arc::new(activity), Arc::new(inactivity)).with_shutdowns(Arc::new(off), 1.0),
    ))
}

/// Baseline scenario shrunk to four computers over six hours.
pub fn small_config() -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.horizon_secs = 6.0 * 3_600.0;
    cfg.simulation.min_runs = 2;
    cfg.simulation.max_runs = 4;
    cfg.simulation.threads = 2;
    cfg.fleet.computers = 4;
    cfg
}

/// Path of a file shipped with the crate.
pub fn repo_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}
