//! Headline figures derived from a stats snapshot.

use std::fmt;

use serde::Serialize;

use super::{StatsSnapshot, metric};
use crate::sim::policy::PowerDraw;

/// Joules in one kilowatt-hour.
pub const JOULES_PER_KWH: f64 = 3.6e6;

/// Fleet-level indicators, averaged per run.
///
/// Computed post-hoc from a [`StatsSnapshot`] so that a single run and a
/// merge of many are reported the same way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Runs folded into the snapshot.
    pub runs: u64,
    pub computers: usize,
    /// Fleet energy per run (kWh).
    pub energy_kwh: f64,
    /// Energy per computer per run (kWh).
    pub energy_kwh_per_computer: f64,
    /// Energy had every computer stayed awake, drawing idle power whenever
    /// not active (kWh per run).
    pub always_on_kwh: f64,
    /// Reduction relative to `always_on_kwh`.
    pub savings_pct: f64,
    pub active_pct: f64,
    pub idle_pct: f64,
    pub sleep_pct: f64,
    pub off_pct: f64,
    /// Share of time switched off by users.
    pub user_off_pct: f64,
    /// Share of time switched off by the working-hours schedule.
    pub auto_off_pct: f64,
    /// Mean weighted user satisfaction over served requests.
    pub satisfaction_pct: f64,
    /// Share of inactive awake-or-asleep time spent asleep.
    pub removed_inactivity_pct: f64,
    pub transitions: f64,
    pub requests_served: f64,
    pub requests_rejected: f64,
    pub user_shutdowns: f64,
    /// Mean wake latency paid by requests that woke a computer (s).
    pub mean_wake_latency_secs: f64,
}

impl RunReport {
    /// Computes the report.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Stats of one or more runs
    /// * `power` - Per-state draw used for the always-on baseline
    /// * `computers` - Computers simulated per run
    pub fn from_snapshot(snapshot: &StatsSnapshot, power: &PowerDraw, computers: usize) -> Self {
        let runs = snapshot.runs.max(1) as f64;
        let per_run = |name: &str| snapshot.sum(name) / runs;

        let active = per_run(metric::ACTIVE_SECONDS);
        let idle = per_run(metric::IDLE_SECONDS);
        let sleep = per_run(metric::SLEEP_SECONDS);
        let off = per_run(metric::OFF_SECONDS);
        let total = active + idle + sleep + off;
        let pct = |x: f64| if total > 0.0 { 100.0 * x / total } else { 0.0 };

        let energy_kwh = per_run(metric::ENERGY_JOULES) / JOULES_PER_KWH;
        let always_on_kwh = (active * power.active_w + (idle + sleep + off) * power.idle_w) / JOULES_PER_KWH;
        let savings_pct = if always_on_kwh > 0.0 {
            100.0 * (1.0 - energy_kwh / always_on_kwh)
        } else {
            0.0
        };

        let satisfaction_pct = snapshot
            .get(metric::USER_SATISFACTION)
            .and_then(|a| a.mean())
            .map_or(100.0, |m| 100.0 * m);
        let removed_inactivity_pct = if idle + sleep > 0.0 {
            100.0 * sleep / (idle + sleep)
        } else {
            0.0
        };

        Self {
            runs: snapshot.runs,
            computers,
            energy_kwh,
            energy_kwh_per_computer: if computers > 0 {
                energy_kwh / computers as f64
            } else {
                0.0
            },
            always_on_kwh,
            savings_pct,
            active_pct: pct(active),
            idle_pct: pct(idle),
            sleep_pct: pct(sleep),
            off_pct: pct(off),
            user_off_pct: pct(per_run(metric::USER_SHUTDOWN_SECONDS)),
            auto_off_pct: pct(per_run(metric::AUTO_SHUTDOWN_SECONDS)),
            satisfaction_pct,
            removed_inactivity_pct,
            transitions: per_run(metric::TRANSITIONS_COUNT),
            requests_served: per_run(metric::REQUESTS_SERVED),
            requests_rejected: per_run(metric::REQUESTS_REJECTED),
            user_shutdowns: per_run(metric::USER_SHUTDOWNS),
            mean_wake_latency_secs: snapshot
                .get(metric::WAKE_LATENCY_SECONDS)
                .and_then(|a| a.mean())
                .unwrap_or(0.0),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Fleet Report ---")?;
        writeln!(f, "Runs:                  {}", self.runs)?;
        writeln!(f, "Computers:             {}", self.computers)?;
        writeln!(f, "Energy consumed:       {:.3} kWh", self.energy_kwh)?;
        writeln!(f, "Energy per computer:   {:.3} kWh", self.energy_kwh_per_computer)?;
        writeln!(f, "Always-on baseline:    {:.3} kWh", self.always_on_kwh)?;
        writeln!(f, "Energy savings:        {:.1}%", self.savings_pct)?;
        writeln!(
            f,
            "Time in state:         active {:.1}% / idle {:.1}% / sleep {:.1}% / off {:.1}%",
            self.active_pct, self.idle_pct, self.sleep_pct, self.off_pct
        )?;
        writeln!(
            f,
            "Off time:              user {:.1}% / schedule {:.1}%",
            self.user_off_pct, self.auto_off_pct
        )?;
        writeln!(f, "User shutdowns:        {:.1}", self.user_shutdowns)?;
        writeln!(f, "User satisfaction:     {:.1}%", self.satisfaction_pct)?;
        writeln!(f, "Removed inactivity:    {:.1}%", self.removed_inactivity_pct)?;
        writeln!(f, "Mean wake latency:     {:.2} s", self.mean_wake_latency_secs)?;
        writeln!(f, "Transitions:           {:.1}", self.transitions)?;
        writeln!(f, "Requests served:       {:.1}", self.requests_served)?;
        write!(f, "Requests rejected:     {:.1}", self.requests_rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Stats;

    const POWER: PowerDraw = PowerDraw {
        active_w: 100.0,
        idle_w: 50.0,
        sleep_w: 5.0,
        off_w: 0.0,
    };

    fn one_hour_split() -> Stats {
        let mut stats = Stats::with_catalogue(&[0.0, 60.0, f64::INFINITY]).unwrap();
        // 1200 s active, 1200 s idle, 1200 s asleep
        for (name, watts) in [
            (metric::ACTIVE_SECONDS, 100.0),
            (metric::IDLE_SECONDS, 50.0),
            (metric::SLEEP_SECONDS, 5.0),
        ] {
            stats.record(name, 1_200.0);
            stats.record(metric::ENERGY_JOULES, 1_200.0 * watts);
        }
        stats.record(metric::USER_SATISFACTION, 1.0);
        stats.record(metric::USER_SATISFACTION, 0.5);
        stats
    }

    #[test]
    fn report_from_single_run() {
        let r = RunReport::from_snapshot(&one_hour_split().snapshot(), &POWER, 1);
        assert!((r.energy_kwh - 186_000.0 / JOULES_PER_KWH).abs() < 1e-12);
        assert!((r.always_on_kwh - 240_000.0 / JOULES_PER_KWH).abs() < 1e-12);
        assert!((r.savings_pct - 22.5).abs() < 1e-9);
        assert!((r.sleep_pct - 100.0 / 3.0).abs() < 1e-9);
        assert!((r.satisfaction_pct - 75.0).abs() < 1e-9);
        assert!((r.removed_inactivity_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn merged_runs_are_averaged() {
        let a = one_hour_split();
        let merged = a.merge(&a).unwrap();
        let single = RunReport::from_snapshot(&a.snapshot(), &POWER, 1);
        let double = RunReport::from_snapshot(&merged.snapshot(), &POWER, 1);
        assert_eq!(double.runs, 2);
        assert!((double.energy_kwh - single.energy_kwh).abs() < 1e-12);
        assert!((double.savings_pct - single.savings_pct).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_reports_full_satisfaction() {
        let r = RunReport::from_snapshot(&Stats::new().snapshot(), &POWER, 0);
        assert_eq!(r.satisfaction_pct, 100.0);
        assert_eq!(r.savings_pct, 0.0);
        assert_eq!(r.energy_kwh_per_computer, 0.0);
    }

    #[test]
    fn display_contains_headline_lines() {
        let text = RunReport::from_snapshot(&one_hour_split().snapshot(), &POWER, 1).to_string();
        assert!(text.starts_with("--- Fleet Report ---"));
        assert!(text.contains("Energy savings:        22.5%"));
        assert!(text.contains("User satisfaction:     75.0%"));
    }

    #[test]
    fn off_time_is_split_by_cause() {
        let mut stats = Stats::with_catalogue(&[0.0, 60.0, f64::INFINITY]).unwrap();
        stats.record(metric::ACTIVE_SECONDS, 2_000.0);
        stats.record(metric::OFF_SECONDS, 1_500.0);
        stats.record(metric::USER_SHUTDOWN_SECONDS, 500.0);
        stats.record(metric::OFF_SECONDS, 500.0);
        stats.record(metric::AUTO_SHUTDOWN_SECONDS, 1_500.0);
        stats.record(metric::USER_SHUTDOWNS, 1.0);
        let r = RunReport::from_snapshot(&stats.snapshot(), &POWER, 1);
        assert_eq!(r.off_pct, 50.0);
        assert_eq!(r.user_off_pct, 12.5);
        assert_eq!(r.auto_off_pct, 37.5);
        assert_eq!(r.user_shutdowns, 1.0);
        assert!(r.to_string().contains("Off time:              user 12.5% / schedule 37.5%"));
    }
}
