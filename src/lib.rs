//! Discrete-event simulator of a fleet of computers under a power
//! management policy, driven by user activity models fitted to historical
//! traces.

pub mod activity;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod dist;
pub mod error;
pub mod io;
pub mod runner;
/// Event scheduler, agents and the per-run simulation.
pub mod sim;
pub mod stats;
pub mod telemetry;
