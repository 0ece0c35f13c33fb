//! Scenario orchestration: fleet construction, timeout tuning and parallel
//! Monte Carlo replication.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity::{Fleet, TraceDataset, TrainingGaps};
use crate::config::{ScenarioConfig, TimeoutMode};
use crate::dist::DistributionCache;
use crate::error::SimError;
use crate::sim::engine::{RunResult, Simulation};
use crate::sim::policy::{PowerPolicy, SatisfactionTarget, TimeoutTable};
use crate::stats::{JOULES_PER_KWH, RunReport, Stats, StatsSnapshot, metric};

/// Two-sided 95% Student-t quantiles for 1..=30 degrees of freedom.
const T_975: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160, 2.145,
    2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056, 2.052, 2.048,
    2.045, 2.042,
];

/// Normal quantile used beyond the table.
const Z_975: f64 = 1.96;

/// Sample mean with a 95% confidence half-width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    /// Infinite with fewer than two samples.
    pub half_width: f64,
    pub samples: usize,
}

impl ConfidenceInterval {
    /// Student-t interval over independent observations.
    pub fn from_samples(xs: &[f64]) -> Self {
        let n = xs.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                half_width: f64::INFINITY,
                samples: 0,
            };
        }
        let mean = xs.iter().sum::<f64>() / n as f64;
        if n < 2 {
            return Self {
                mean,
                half_width: f64::INFINITY,
                samples: n,
            };
        }
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let t = T_975.get(n - 2).copied().unwrap_or(Z_975);
        Self {
            mean,
            half_width: t * (var / n as f64).sqrt(),
            samples: n,
        }
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} +/- {:.3} (n={})", self.mean, self.half_width, self.samples)
    }
}

/// Timeouts a scenario is simulated with, after tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPlan {
    /// Fleet-wide timeouts.
    pub policy: PowerPolicy,
    /// Time-to-sleep tables in fleet order; empty unless tuned per computer.
    pub per_computer: Vec<Arc<TimeoutTable>>,
}

impl TimeoutPlan {
    pub fn fixed(policy: PowerPolicy) -> Self {
        Self {
            policy,
            per_computer: Vec::new(),
        }
    }

    /// Table of the `i`-th fleet member, if tuned per computer.
    pub fn table_for(&self, i: usize) -> Option<&Arc<TimeoutTable>> {
        self.per_computer.get(i)
    }

    /// Time-to-sleep averaged over computers and hours of the week.
    pub fn mean_time_to_sleep(&self) -> f64 {
        if self.per_computer.is_empty() {
            return self.policy.time_to_sleep();
        }
        self.per_computer.iter().map(|t| t.mean()).sum::<f64>() / self.per_computer.len() as f64
    }
}

/// Merged outcome of all replications of a scenario.
#[derive(Debug, Clone)]
pub struct ReplicationSummary {
    pub stats: Stats,
    pub report: RunReport,
    /// Timeouts actually simulated, after tuning.
    pub plan: TimeoutPlan,
    /// Runs merged into `stats`.
    pub runs: usize,
    /// Runs dropped because their stats could not be merged.
    pub discarded: usize,
    /// Energy per computer per run (kWh).
    pub energy_kwh: ConfidenceInterval,
    /// Mean user satisfaction per run (%).
    pub satisfaction_pct: ConfidenceInterval,
    pub converged: bool,
}

impl ReplicationSummary {
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl fmt::Display for ReplicationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.report)?;
        writeln!(f, "--- Replications ---")?;
        writeln!(f, "Idle timeout:          {:.0} s", self.plan.policy.idle_timeout)?;
        if self.plan.per_computer.is_empty() {
            writeln!(f, "Sleep timeout:         {:.0} s", self.plan.policy.sleep_timeout)?;
        } else {
            writeln!(
                f,
                "Time to sleep:         per computer, mean {:.0} s",
                self.plan.mean_time_to_sleep()
            )?;
        }
        writeln!(f, "Energy per computer:   {} kWh", self.energy_kwh)?;
        writeln!(f, "Satisfaction:          {} %", self.satisfaction_pct)?;
        writeln!(f, "Discarded runs:        {}", self.discarded)?;
        write!(f, "Converged:             {}", if self.converged { "yes" } else { "no" })
    }
}

fn ensure_valid(cfg: &ScenarioConfig) -> Result<(), SimError> {
    match cfg.validate().into_iter().next() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Builds the fleet from the configured trace, or a synthetic one if no
/// trace path is set.
///
/// With a training trace, only computers present in both traces are
/// simulated, and their timeouts are tuned on the training trace.
///
/// # Errors
///
/// Returns `SimError` for an invalid configuration, an unreadable or
/// malformed trace, traces without a shared computer, or data that cannot
/// be fitted.
pub fn build_fleet(cfg: &ScenarioConfig) -> Result<Fleet, SimError> {
    ensure_valid(cfg)?;
    let mut cache = DistributionCache::new();
    let filter = cfg.trace.filter();
    let fleet = match &cfg.trace.path {
        Some(path) => {
            let mut dataset = TraceDataset::from_path(path, &filter)?;
            let training = match &cfg.trace.training_path {
                Some(training_path) => {
                    let mut training = TraceDataset::from_path(training_path, &filter)?;
                    let dropped = dataset.intersect(&mut training)?;
                    info!(
                        shared = dataset.len(),
                        dropped = dropped.len(),
                        "training trace intersected"
                    );
                    Some(training)
                }
                None => None,
            };
            Fleet::from_trace(&dataset, training.as_ref(), &cfg.trace.model_options()?, &mut cache)?
        }
        None => Fleet::synthetic(&cfg.synthetic_fleet(), &mut cache, cfg.simulation.seed)?,
    };
    debug!(distinct = cache.len(), reused = cache.hits(), "distribution cache");
    Ok(fleet)
}

/// Timeouts to simulate: the configured ones, the sleep timeout tuned so
/// that the time-to-sleep meets the satisfaction target over the fleet's
/// inactivity samples, or one table per computer tuned on its own training
/// gaps.
///
/// # Errors
///
/// Returns `SimError::Config` for an invalid timeout mode.
pub fn resolve_timeouts(cfg: &ScenarioConfig, fleet: &Fleet) -> Result<TimeoutPlan, SimError> {
    let mut policy = cfg.power_policy();
    let target = |target_pct| SatisfactionTarget {
        target_pct,
        threshold_secs: cfg.policy.satisfaction_threshold_secs,
        lo: cfg.trace.xmin,
        hi: cfg.trace.xmax,
    };
    match cfg.timeout_mode()? {
        TimeoutMode::Fixed => Ok(TimeoutPlan::fixed(policy)),
        TimeoutMode::TargetSatisfaction { target_pct } => {
            let time_to_sleep = target(target_pct).solve(fleet.inactivity_samples());
            policy.sleep_timeout = (time_to_sleep - policy.idle_timeout).max(0.0);
            info!(
                target_pct,
                time_to_sleep,
                sleep_timeout = policy.sleep_timeout,
                "timeout tuned to satisfaction target"
            );
            Ok(TimeoutPlan::fixed(policy))
        }
        TimeoutMode::PerComputer { target_pct } => {
            let target = target(target_pct);
            // members sharing training gaps share one table
            let mut tuned: Vec<(Arc<TrainingGaps>, Arc<TimeoutTable>)> = Vec::new();
            let mut per_computer = Vec::with_capacity(fleet.len());
            for member in fleet.members() {
                let table = match tuned.iter().find(|(gaps, _)| Arc::ptr_eq(gaps, &member.training)) {
                    Some((_, table)) => Arc::clone(table),
                    None => {
                        let table = Arc::new(TimeoutTable::tune(&member.training, &target));
                        tuned.push((Arc::clone(&member.training), Arc::clone(&table)));
                        table
                    }
                };
                debug!(computer = %member.name, mean_time_to_sleep = table.mean(), "timeouts tuned");
                per_computer.push(table);
            }
            let plan = TimeoutPlan {
                policy,
                per_computer,
            };
            info!(
                target_pct,
                tables = tuned.len(),
                mean_time_to_sleep = plan.mean_time_to_sleep(),
                "timeouts tuned per computer"
            );
            Ok(plan)
        }
    }
}

/// Executes one run of the scenario with the given seed.
///
/// # Errors
///
/// Returns `SimError` for an invalid configuration or a scheduling defect.
pub fn run_once(
    cfg: &ScenarioConfig,
    fleet: &Fleet,
    plan: &TimeoutPlan,
    seed: u64,
) -> Result<RunResult, SimError> {
    ensure_valid(cfg)?;
    let mut sim = Simulation::new(cfg.simulation.horizon_secs, seed, &cfg.stats.duration_edges_secs)?
        .with_satisfaction_threshold(cfg.policy.satisfaction_threshold_secs);
    let power = cfg.power_draw();
    let working_hours = cfg.working_hours();
    let bounds = cfg.sampling_bounds()?;
    for (i, member) in fleet.members().iter().enumerate() {
        let name = member.name.clone();
        let pc = match plan.table_for(i) {
            Some(table) => sim.add_tuned_computer(name, plan.policy, power, working_hours, Arc::clone(table))?,
            None => sim.add_computer(name, plan.policy, power, working_hours)?,
        };
        sim.add_user(pc, Arc::clone(&member.model), bounds)?;
    }
    sim.run()
}

/// Per-run observations tracked for the stopping rule.
fn observe(snapshot: &StatsSnapshot, computers: usize) -> (f64, f64) {
    let energy = snapshot.sum(metric::ENERGY_JOULES) / computers.max(1) as f64 / JOULES_PER_KWH;
    let satisfaction = snapshot
        .get(metric::USER_SATISFACTION)
        .and_then(|a| a.mean())
        .map_or(100.0, |m| 100.0 * m);
    (energy, satisfaction)
}

/// Runs independent replications in parallel until both confidence
/// half-widths fall below `simulation.max_confidence_width`, or
/// `simulation.max_runs` is reached.
///
/// Run `i` is seeded with `simulation.seed + i`. Runs are computed in
/// parallel batches but merged in seed order, and the stopping rule is
/// checked after every merged run. Runs computed past the stopping point
/// are dropped, so the outcome does not depend on the number of threads.
///
/// # Errors
///
/// Returns `SimError` for an invalid configuration, a failure to start the
/// worker pool, or any run aborting. A run whose stats cannot be merged is
/// discarded instead.
pub fn run_replications(cfg: &ScenarioConfig, fleet: &Fleet) -> Result<ReplicationSummary, SimError> {
    ensure_valid(cfg)?;
    let sim = &cfg.simulation;
    let mut builder = rayon::ThreadPoolBuilder::new();
    if sim.threads > 0 {
        builder = builder.num_threads(sim.threads);
    }
    let pool = builder.build()?;
    let plan = resolve_timeouts(cfg, fleet)?;
    info!(
        computers = fleet.len(),
        min_runs = sim.min_runs,
        max_runs = sim.max_runs,
        threads = pool.current_num_threads(),
        "replications started"
    );

    let mut merged: Option<Stats> = None;
    let mut energy = Vec::new();
    let mut satisfaction = Vec::new();
    let mut discarded = 0;
    let mut next = 0;
    let mut converged = false;

    'batches: while next < sim.max_runs {
        let batch = if next == 0 {
            sim.min_runs
        } else {
            pool.current_num_threads().max(1)
        }
        .min(sim.max_runs - next);
        let seeds: Vec<u64> = (next..next + batch)
            .map(|i| sim.seed.wrapping_add(i as u64))
            .collect();
        let results: Vec<Result<RunResult, SimError>> = pool.install(|| {
            seeds
                .par_iter()
                .map(|&seed| run_once(cfg, fleet, &plan, seed))
                .collect()
        });
        next += batch;

        for (i, (seed, result)) in seeds.iter().zip(results).enumerate() {
            let run = result?;
            let accepted = match merged.take() {
                None => {
                    merged = Some(run.stats.clone());
                    true
                }
                Some(acc) => match acc.merge(&run.stats) {
                    Ok(m) => {
                        merged = Some(m);
                        true
                    }
                    Err(e) => {
                        warn!(seed, error = %e, "discarding run with incompatible stats");
                        merged = Some(acc);
                        false
                    }
                },
            };
            if !accepted {
                discarded += 1;
                continue;
            }
            let (e, s) = observe(&run.stats.snapshot(), fleet.len());
            debug!(seed, energy_kwh = e, satisfaction_pct = s, events = run.events, "run merged");
            energy.push(e);
            satisfaction.push(s);

            if energy.len() >= sim.min_runs && within_width(&energy, &satisfaction, sim.max_confidence_width) {
                debug!(dropped = batch - i - 1, "stopping rule met");
                converged = true;
                break 'batches;
            }
        }

        info!(
            runs = energy.len(),
            energy_half_width = ConfidenceInterval::from_samples(&energy).half_width,
            satisfaction_half_width = ConfidenceInterval::from_samples(&satisfaction).half_width,
            "batch finished"
        );
    }

    let stats = merged.ok_or(SimError::NoRuns)?;
    if !converged {
        warn!(
            runs = energy.len(),
            max_runs = sim.max_runs,
            "confidence target not reached"
        );
    }
    let report = RunReport::from_snapshot(&stats.snapshot(), &cfg.power_draw(), fleet.len());
    Ok(ReplicationSummary {
        report,
        plan,
        runs: energy.len(),
        discarded,
        energy_kwh: ConfidenceInterval::from_samples(&energy),
        satisfaction_pct: ConfidenceInterval::from_samples(&satisfaction),
        converged,
        stats,
    })
}

fn within_width(energy: &[f64], satisfaction: &[f64], width: f64) -> bool {
    ConfidenceInterval::from_samples(energy).half_width <= width
        && ConfidenceInterval::from_samples(satisfaction).half_width <= width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::HOUR;

    fn small() -> ScenarioConfig {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.horizon_secs = 6.0 * HOUR;
        cfg.simulation.min_runs = 2;
        cfg.simulation.max_runs = 4;
        cfg.simulation.threads = 2;
        cfg.fleet.computers = 3;
        cfg
    }

    #[test]
    fn confidence_interval_matches_hand_computation() {
        let ci = ConfidenceInterval::from_samples(&[1.0, 2.0, 3.0]);
        assert!((ci.mean - 2.0).abs() < 1e-12);
        // sd = 1, t(2) = 4.303
        assert!((ci.half_width - 4.303 / 3f64.sqrt()).abs() < 1e-9);
        assert!(ConfidenceInterval::from_samples(&[5.0]).half_width.is_infinite());
    }

    #[test]
    fn synthetic_fleet_has_configured_size() {
        let cfg = small();
        let fleet = build_fleet(&cfg).unwrap();
        assert_eq!(fleet.len(), 3);
        assert_eq!(fleet.members()[0].name, "workstation0");
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut cfg = small();
        cfg.simulation.horizon_secs = -1.0;
        assert!(matches!(build_fleet(&cfg), Err(SimError::Config(_))));
    }

    #[test]
    fn fixed_mode_keeps_configured_policy() {
        let cfg = small();
        let fleet = build_fleet(&cfg).unwrap();
        let plan = resolve_timeouts(&cfg, &fleet).unwrap();
        assert_eq!(plan, TimeoutPlan::fixed(cfg.power_policy()));
        assert_eq!(plan.mean_time_to_sleep(), cfg.power_policy().time_to_sleep());
    }

    #[test]
    fn target_mode_tunes_sleep_timeout() {
        let mut cfg = small();
        cfg.policy.timeout_mode = "target_satisfaction".to_string();
        cfg.policy.target_satisfaction_pct = 99.0;
        let fleet = build_fleet(&cfg).unwrap();
        let plan = resolve_timeouts(&cfg, &fleet).unwrap();
        assert!(plan.per_computer.is_empty());
        assert_eq!(plan.policy.idle_timeout, cfg.policy.idle_timeout_secs);
        assert!(plan.policy.time_to_sleep() >= cfg.trace.xmin);
        assert!(plan.policy.time_to_sleep() <= cfg.trace.xmax);
    }

    #[test]
    fn per_computer_mode_shares_tables_of_shared_gaps() {
        let mut cfg = small();
        cfg.policy.timeout_mode = "per_computer".to_string();
        cfg.policy.target_satisfaction_pct = 95.0;
        let fleet = build_fleet(&cfg).unwrap();
        let plan = resolve_timeouts(&cfg, &fleet).unwrap();
        assert_eq!(plan.per_computer.len(), 3);
        // synthetic members share their reference gaps
        assert!(Arc::ptr_eq(&plan.per_computer[0], &plan.per_computer[2]));
        let t = plan.mean_time_to_sleep();
        assert!(t >= cfg.trace.xmin && t <= cfg.trace.xmax, "{t}");

        let run = run_once(&cfg, &fleet, &plan, 3).unwrap();
        assert_eq!(run.computers.len(), 3);
    }

    #[test]
    fn replications_are_reproducible_and_bounded() {
        let cfg = small();
        let fleet = build_fleet(&cfg).unwrap();
        let a = run_replications(&cfg, &fleet).unwrap();
        let b = run_replications(&cfg, &fleet).unwrap();
        assert!(a.runs >= 2 && a.runs <= 4);
        assert_eq!(a.discarded, 0);
        assert_eq!(a.stats.runs(), a.runs as u64);
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn single_run_conserves_time() {
        let cfg = small();
        let fleet = build_fleet(&cfg).unwrap();
        let plan = resolve_timeouts(&cfg, &fleet).unwrap();
        let run = run_once(&cfg, &fleet, &plan, 7).unwrap();
        for c in &run.computers {
            assert!((c.total_secs() - cfg.simulation.horizon_secs).abs() < 1e-6);
        }
    }
}
