//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::{FallbackPolicy, ModelOptions, SyntheticFleet, TraceFilter, WEEK};
use crate::dist::fit::DEFAULT_KDE_BELOW;
use crate::dist::{FitPolicy, MAX_BINS, PowerLawFit};
use crate::sim::policy::{PowerDraw, PowerPolicy, SATISFACTION_GRACE_SECS, WorkingHours};
use crate::sim::user::{MIN_ACTIVITY_SECS, SamplingBounds};
use crate::stats::histogram::valid_edges;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon, seeding and replication control.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Watts drawn per power state.
    #[serde(default)]
    pub power: PowerConfig,
    /// Inactivity timeouts and their tuning.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Administrative on/off schedule.
    #[serde(default)]
    pub working_hours: WorkingHoursConfig,
    /// Historical usage trace and how it is fitted.
    #[serde(default)]
    pub trace: TraceConfig,
    /// Synthetic fleet used when no trace is configured.
    #[serde(default)]
    pub fleet: FleetConfig,
    /// Histogram layout of recorded durations.
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Horizon, seeding and Monte Carlo replication control.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Virtual seconds per run (must be > 0).
    pub horizon_secs: f64,
    /// Master random seed; run `i` uses `seed + i`.
    pub seed: u64,
    /// Runs always executed before checking convergence.
    pub min_runs: usize,
    /// Upper bound on runs.
    pub max_runs: usize,
    /// Target 95% confidence half-width for energy (kWh per computer) and
    /// satisfaction (%).
    pub max_confidence_width: f64,
    /// Worker threads for parallel runs; 0 uses one per core.
    pub threads: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_secs: WEEK,
            seed: 42,
            min_runs: 3,
            max_runs: 20,
            max_confidence_width: 1.0,
            threads: 0,
        }
    }
}

/// Watts drawn per power state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PowerConfig {
    pub active_w: f64,
    pub idle_w: f64,
    pub sleep_w: f64,
    pub off_w: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            active_w: 80.0,
            idle_w: 50.0,
            sleep_w: 3.0,
            off_w: 1.0,
        }
    }
}

/// Inactivity timeouts and their tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Seconds after the last request before a computer goes idle.
    pub idle_timeout_secs: f64,
    /// Seconds idle before a computer sleeps.
    pub sleep_timeout_secs: f64,
    /// Seconds a sleeping computer needs to resume.
    pub wake_latency_secs: f64,
    /// `"fixed"`, `"target_satisfaction"` or `"per_computer"`.
    pub timeout_mode: String,
    /// Mean user satisfaction (%) the tuned timeout must reach.
    pub target_satisfaction_pct: f64,
    /// Return delay after sleep at which a user is fully satisfied (> 60).
    pub satisfaction_threshold_secs: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300.0,
            sleep_timeout_secs: 900.0,
            wake_latency_secs: 5.0,
            timeout_mode: "fixed".to_string(),
            target_satisfaction_pct: 90.0,
            satisfaction_threshold_secs: 300.0,
        }
    }
}

/// How the sleep timeout is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutMode {
    /// Use the configured timeouts as-is.
    Fixed,
    /// Tune the time-to-sleep to reach a mean satisfaction percentage.
    TargetSatisfaction { target_pct: f64 },
    /// Tune one time-to-sleep per computer and hour of the week on that
    /// computer's training gaps.
    PerComputer { target_pct: f64 },
}

/// Administrative on/off schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkingHoursConfig {
    pub enabled: bool,
    /// Hour computers are switched on (0..24).
    pub on_hour: u8,
    /// Hour computers are switched off (on_hour < off_hour <= 24).
    pub off_hour: u8,
    /// Leave computers off on weekends.
    pub weekdays_only: bool,
}

impl Default for WorkingHoursConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_hour: 8,
            off_hour: 19,
            weekdays_only: true,
        }
    }
}

/// Historical usage trace and how it is fitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    /// JSON trace file; absent selects the synthetic fleet.
    pub path: Option<PathBuf>,
    /// Trace the timeouts are tuned on; absent tunes on `path`. Computers
    /// missing from either trace are dropped.
    pub training_path: Option<PathBuf>,
    /// Shortest inactivity gap kept, in seconds (> 0).
    pub xmin: f64,
    /// Longest interval kept, in seconds.
    pub xmax: f64,
    /// Inactivity gaps above this are redrawn.
    pub noise_threshold: Option<f64>,
    /// `"histogram"`, `"kde"`, `"power_law"` or `"auto"`.
    pub fit: String,
    /// Histogram bins; 0 uses the square-root rule. At most 10000.
    pub bins: usize,
    /// `auto` smooths data sets smaller than this with a KDE.
    pub kde_below: usize,
    /// Fixed power-law exponent; absent estimates it by maximum likelihood.
    pub power_law_alpha: Option<f64>,
    /// One model per computer.
    pub per_computer: bool,
    /// One profile per hour of the week.
    pub per_hour: bool,
    /// `"aggregate"` or `"previous_hour"`.
    pub fallback: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            path: None,
            training_path: None,
            xmin: 60.0,
            xmax: 28_800.0,
            noise_threshold: None,
            fit: "auto".to_string(),
            bins: 0,
            kde_below: DEFAULT_KDE_BELOW,
            power_law_alpha: None,
            per_computer: true,
            per_hour: true,
            fallback: "aggregate".to_string(),
        }
    }
}

/// Synthetic fleet used when no trace is configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Number of computers (must be > 0).
    pub computers: usize,
    pub activity_mean_secs: f64,
    pub activity_std_secs: f64,
    pub inactivity_mean_secs: f64,
    pub inactivity_std_secs: f64,
    /// Exponent of the inactivity power-law tail (> 1).
    pub tail_exponent: f64,
    /// Share of inactivity gaps drawn from the tail, in `[0, 1)`.
    pub tail_weight: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            computers: 10,
            activity_mean_secs: 600.0,
            activity_std_secs: 900.0,
            inactivity_mean_secs: 900.0,
            inactivity_std_secs: 1_800.0,
            tail_exponent: 1.8,
            tail_weight: 0.1,
        }
    }
}

/// Histogram layout of recorded durations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatsConfig {
    /// Strictly increasing bin edges in seconds, shared by every duration metric.
    pub duration_edges_secs: Vec<f64>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            duration_edges_secs: vec![
                0.0, 10.0, 60.0, 300.0, 900.0, 1_800.0, 3_600.0, 7_200.0, 14_400.0, 28_800.0, 86_400.0,
            ],
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.horizon_secs"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: fixed timeouts, always-on schedule.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the office-hours preset: machines are switched off outside
    /// weekday working hours.
    pub fn office_hours() -> Self {
        Self {
            working_hours: WorkingHoursConfig {
                enabled: true,
                ..WorkingHoursConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the aggressive preset: short idle timeout with the sleep
    /// timeout tuned down to a lower satisfaction target.
    pub fn aggressive() -> Self {
        Self {
            policy: PolicyConfig {
                idle_timeout_secs: 60.0,
                sleep_timeout_secs: 120.0,
                wake_latency_secs: 10.0,
                timeout_mode: "target_satisfaction".to_string(),
                target_satisfaction_pct: 80.0,
                ..PolicyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "office_hours", "aggressive"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "office_hours" => Ok(Self::office_hours()),
            "aggressive" => Ok(Self::aggressive()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// Relative trace paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            for trace in [cfg.trace.path.as_mut(), cfg.trace.training_path.as_mut()]
                .into_iter()
                .flatten()
            {
                if trace.is_relative() {
                    *trace = dir.join(&*trace);
                }
            }
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let e = &mut errors;

        let s = &self.simulation;
        check(
            e,
            s.horizon_secs.is_finite() && s.horizon_secs > 0.0,
            "simulation.horizon_secs",
            "must be finite and > 0",
        );
        check(e, s.min_runs > 0, "simulation.min_runs", "must be > 0");
        check(e, s.max_runs >= s.min_runs, "simulation.max_runs", "must be >= simulation.min_runs");
        check(
            e,
            s.max_confidence_width > 0.0,
            "simulation.max_confidence_width",
            "must be > 0",
        );

        let p = &self.power;
        for (field, w) in [
            ("power.active_w", p.active_w),
            ("power.idle_w", p.idle_w),
            ("power.sleep_w", p.sleep_w),
            ("power.off_w", p.off_w),
        ] {
            check(e, w.is_finite() && w >= 0.0, field, "must be finite and >= 0");
        }

        let pol = &self.policy;
        for (field, v) in [
            ("policy.idle_timeout_secs", pol.idle_timeout_secs),
            ("policy.sleep_timeout_secs", pol.sleep_timeout_secs),
            ("policy.wake_latency_secs", pol.wake_latency_secs),
        ] {
            check(e, v.is_finite() && v >= 0.0, field, "must be finite and >= 0");
        }
        check(
            e,
            pol.satisfaction_threshold_secs > SATISFACTION_GRACE_SECS,
            "policy.satisfaction_threshold_secs",
            "must be > 60",
        );
        if let Err(err) = self.timeout_mode() {
            e.push(err);
        }

        let wh = &self.working_hours;
        check(e, wh.on_hour < 24, "working_hours.on_hour", "must be < 24");
        check(e, wh.off_hour <= 24, "working_hours.off_hour", "must be <= 24");
        check(
            e,
            wh.on_hour < wh.off_hour,
            "working_hours.on_hour",
            "must be < working_hours.off_hour",
        );

        let t = &self.trace;
        check(e, t.xmin > 0.0 && t.xmin.is_finite(), "trace.xmin", "must be finite and > 0");
        check(e, t.xmax > t.xmin && t.xmax.is_finite(), "trace.xmax", "must be finite and > trace.xmin");
        check(e, t.xmax >= MIN_ACTIVITY_SECS, "trace.xmax", "must be >= 0.1");
        check(
            e,
            t.noise_threshold.is_none_or(|n| n >= t.xmin),
            "trace.noise_threshold",
            "must be >= trace.xmin",
        );
        check(
            e,
            t.power_law_alpha.is_none_or(|a| a > 1.0),
            "trace.power_law_alpha",
            "must be > 1",
        );
        check(e, t.bins <= MAX_BINS, "trace.bins", "must be <= 10000");
        check(
            e,
            t.training_path.is_none() || t.path.is_some(),
            "trace.training_path",
            "requires trace.path",
        );
        if let Err(err) = t.fit_policy() {
            e.push(err);
        }
        if let Err(err) = t.fallback_policy() {
            e.push(err);
        }

        if t.path.is_none() {
            let f = &self.fleet;
            check(e, f.computers > 0, "fleet.computers", "must be > 0");
            check(e, f.activity_mean_secs > 0.0, "fleet.activity_mean_secs", "must be > 0");
            check(e, f.activity_std_secs >= 0.0, "fleet.activity_std_secs", "must be >= 0");
            check(e, f.inactivity_mean_secs > 0.0, "fleet.inactivity_mean_secs", "must be > 0");
            check(e, f.inactivity_std_secs >= 0.0, "fleet.inactivity_std_secs", "must be >= 0");
            check(
                e,
                (0.0..1.0).contains(&f.tail_weight),
                "fleet.tail_weight",
                "must be in [0, 1)",
            );
            if f.tail_weight > 0.0 {
                check(e, f.tail_exponent > 1.0, "fleet.tail_exponent", "must be > 1");
                check(
                    e,
                    f.inactivity_mean_secs < t.xmax,
                    "fleet.inactivity_mean_secs",
                    "must be < trace.xmax when a tail is configured",
                );
            }
        }

        check(
            e,
            valid_edges(&self.stats.duration_edges_secs),
            "stats.duration_edges_secs",
            "must hold at least two strictly increasing edges, all finite but the last",
        );

        errors
    }

    /// Parsed `policy.timeout_mode`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown mode or an out-of-range target.
    pub fn timeout_mode(&self) -> Result<TimeoutMode, ConfigError> {
        let pol = &self.policy;
        match pol.timeout_mode.as_str() {
            "fixed" => Ok(TimeoutMode::Fixed),
            mode @ ("target_satisfaction" | "per_computer") => {
                let target_pct = pol.target_satisfaction_pct;
                if !(target_pct > 0.0 && target_pct <= 100.0) {
                    return Err(ConfigError::new(
                        "policy.target_satisfaction_pct",
                        "must be in (0, 100]",
                    ));
                }
                Ok(if mode == "per_computer" {
                    TimeoutMode::PerComputer { target_pct }
                } else {
                    TimeoutMode::TargetSatisfaction { target_pct }
                })
            }
            other => Err(ConfigError::new(
                "policy.timeout_mode",
                format!(
                    "must be \"fixed\", \"target_satisfaction\" or \"per_computer\", got \"{other}\""
                ),
            )),
        }
    }

    /// Configured per-state draw.
    pub fn power_draw(&self) -> PowerDraw {
        PowerDraw {
            active_w: self.power.active_w,
            idle_w: self.power.idle_w,
            sleep_w: self.power.sleep_w,
            off_w: self.power.off_w,
        }
    }

    /// Configured timeouts, before any tuning.
    pub fn power_policy(&self) -> PowerPolicy {
        PowerPolicy {
            idle_timeout: self.policy.idle_timeout_secs,
            sleep_timeout: self.policy.sleep_timeout_secs,
            wake_latency: self.policy.wake_latency_secs,
        }
    }

    /// The on/off schedule, if enabled.
    pub fn working_hours(&self) -> Option<WorkingHours> {
        let wh = &self.working_hours;
        wh.enabled.then_some(WorkingHours {
            on_hour: wh.on_hour,
            off_hour: wh.off_hour,
            weekdays_only: wh.weekdays_only,
        })
    }

    /// Sampling ranges for user draws.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the trace bounds leave an empty range.
    pub fn sampling_bounds(&self) -> Result<SamplingBounds, ConfigError> {
        SamplingBounds::new(self.trace.xmin, self.trace.xmax, self.trace.noise_threshold)
    }

    /// Parameters of the synthetic fleet; the tail is cut at `trace.xmax`.
    pub fn synthetic_fleet(&self) -> SyntheticFleet {
        let f = &self.fleet;
        SyntheticFleet {
            computers: f.computers,
            activity_mean_secs: f.activity_mean_secs,
            activity_std_secs: f.activity_std_secs,
            inactivity_mean_secs: f.inactivity_mean_secs,
            inactivity_std_secs: f.inactivity_std_secs,
            tail_exponent: f.tail_exponent,
            tail_weight: f.tail_weight,
            tail_max_secs: self.trace.xmax,
        }
    }
}

fn check(errors: &mut Vec<ConfigError>, ok: bool, field: &str, message: &str) {
    if !ok {
        errors.push(ConfigError::new(field, message));
    }
}

impl TraceConfig {
    pub fn filter(&self) -> TraceFilter {
        TraceFilter {
            xmin: self.xmin,
            xmax: self.xmax,
        }
    }

    /// Parsed `trace.fit`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown fitting policy.
    pub fn fit_policy(&self) -> Result<FitPolicy, ConfigError> {
        match self.fit.as_str() {
            "histogram" => Ok(FitPolicy::Histogram { bins: self.bins }),
            "kde" => Ok(FitPolicy::Kde { bandwidth: None }),
            "power_law" => Ok(FitPolicy::PowerLaw {
                fit: self.power_law_alpha.map_or(PowerLawFit::Mle, PowerLawFit::Fixed),
            }),
            "auto" => Ok(FitPolicy::Auto {
                kde_below: self.kde_below,
                bins: self.bins,
            }),
            other => Err(ConfigError::new(
                "trace.fit",
                format!("must be \"histogram\", \"kde\", \"power_law\" or \"auto\", got \"{other}\""),
            )),
        }
    }

    /// Parsed `trace.fallback`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown fallback policy.
    pub fn fallback_policy(&self) -> Result<FallbackPolicy, ConfigError> {
        match self.fallback.as_str() {
            "aggregate" => Ok(FallbackPolicy::Aggregate),
            "previous_hour" => Ok(FallbackPolicy::PreviousHour),
            other => Err(ConfigError::new(
                "trace.fallback",
                format!("must be \"aggregate\" or \"previous_hour\", got \"{other}\""),
            )),
        }
    }

    /// Model grouping options.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if `fit` or `fallback` is unknown.
    pub fn model_options(&self) -> Result<ModelOptions, ConfigError> {
        Ok(ModelOptions {
            fit: self.fit_policy()?,
            fallback: self.fallback_policy()?,
            per_computer: self.per_computer,
            per_hour: self.per_hour,
        })
    }
}
