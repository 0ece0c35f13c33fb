//! Power-state machine of one computer.

use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use super::agent::EventContext;
use super::clock::EventId;
use super::event::{AgentId, EventKind, Request};
use super::policy::{
    PowerDraw, PowerPolicy, PowerState, TimeoutTable, WorkingHours, weighted_user_satisfaction,
};
use crate::activity::ContextKey;
use crate::config::ConfigError;
use crate::error::SchedulingError;
use crate::stats::{Stats, metric};

/// Satisfaction threshold used when none is configured.
pub const DEFAULT_SATISFACTION_THRESHOLD_SECS: f64 = 300.0;

/// Who switched a computer off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffCause {
    /// The user; their next request powers the computer back on.
    User,
    /// The working-hours schedule; requests are rejected until it ends.
    Admin,
}

impl OffCause {
    fn seconds_metric(self) -> &'static str {
        match self {
            Self::User => metric::USER_SHUTDOWN_SECONDS,
            Self::Admin => metric::AUTO_SHUTDOWN_SECONDS,
        }
    }
}

/// A computer decaying `ACTIVE -> IDLE -> SLEEP` on inactivity, woken by
/// requests, switched `OFF` by its user, and switched `OFF`/on by an
/// optional working-hours schedule.
///
/// Every state change closes the previous state: its duration and energy are
/// recorded into the run's stats together with one transition sample.
#[derive(Debug, Clone)]
pub struct Computer {
    id: AgentId,
    name: String,
    state: PowerState,
    entered_at: f64,
    /// Idle or sleep countdown currently armed.
    pending: Option<EventId>,
    /// Time at which the last accepted request finishes.
    busy_until: f64,
    off_cause: Option<OffCause>,
    policy: PowerPolicy,
    /// Per-context time-to-sleep replacing `policy.sleep_timeout`.
    timeouts: Option<Arc<TimeoutTable>>,
    power: PowerDraw,
    working_hours: Option<WorkingHours>,
    satisfaction_threshold: f64,
    time_in_state: [f64; 4],
    energy_joules: f64,
    transitions: u64,
    served: u64,
    rejected: u64,
    user_shutdowns: u64,
}

/// Per-computer totals at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputerSummary {
    pub name: String,
    pub final_state: PowerState,
    pub active_secs: f64,
    pub idle_secs: f64,
    pub sleep_secs: f64,
    pub off_secs: f64,
    pub energy_joules: f64,
    pub transitions: u64,
    pub requests_served: u64,
    pub requests_rejected: u64,
    pub user_shutdowns: u64,
}

impl ComputerSummary {
    /// Sum of the time spent in every state.
    pub fn total_secs(&self) -> f64 {
        self.active_secs + self.idle_secs + self.sleep_secs + self.off_secs
    }
}

impl Computer {
    /// Creates a computer in `ACTIVE` at time zero.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a timeout or the wake latency is negative
    /// or non-finite.
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        policy: PowerPolicy,
        power: PowerDraw,
        working_hours: Option<WorkingHours>,
    ) -> Result<Self, ConfigError> {
        let fields = [
            ("policy.idle_timeout_secs", policy.idle_timeout),
            ("policy.sleep_timeout_secs", policy.sleep_timeout),
            ("policy.wake_latency_secs", policy.wake_latency),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
            return Err(ConfigError::new(field, "must be finite and >= 0"));
        }
        Ok(Self {
            id,
            name: name.into(),
            state: PowerState::Active,
            entered_at: 0.0,
            pending: None,
            busy_until: 0.0,
            off_cause: None,
            policy,
            timeouts: None,
            power,
            working_hours,
            satisfaction_threshold: DEFAULT_SATISFACTION_THRESHOLD_SECS,
            time_in_state: [0.0; 4],
            energy_joules: 0.0,
            transitions: 0,
            served: 0,
            rejected: 0,
            user_shutdowns: 0,
        })
    }

    /// Replaces the fixed sleep timeout with a time-to-sleep per context of
    /// the week, looked up where the inactivity began.
    pub fn with_timeouts(mut self, timeouts: Arc<TimeoutTable>) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Overrides the return delay at which a woken user is fully satisfied.
    pub fn with_satisfaction_threshold(mut self, threshold_secs: f64) -> Self {
        self.satisfaction_threshold = threshold_secs;
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn policy(&self) -> &PowerPolicy {
        &self.policy
    }

    /// Arms the first idle countdown and the working-hours schedule.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if an event cannot be scheduled.
    pub fn start(&mut self, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        self.entered_at = ctx.now;
        self.busy_until = ctx.now;
        self.pending = Some(ctx.schedule_self(self.policy.idle_timeout, EventKind::IdleTimeout)?);
        if let Some(wh) = self.working_hours {
            let off_at = if wh.is_working(ctx.now) {
                wh.next_off_after(ctx.now)
            } else {
                ctx.now
            };
            ctx.schedule_at(off_at, self.id, EventKind::AdminOff)?;
        }
        Ok(())
    }

    /// Handles one event addressed to this computer.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if a countdown cannot be scheduled.
    pub fn on_event(&mut self, kind: EventKind, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        match kind {
            EventKind::RequestArrival(request) => self.on_request(request, ctx),
            EventKind::IdleTimeout => {
                if self.state == PowerState::Active {
                    self.transition(PowerState::Idle, ctx.now, ctx.stats);
                    self.pending = Some(ctx.schedule_self(self.sleep_delay(), EventKind::SleepTimeout)?);
                }
                Ok(())
            }
            EventKind::SleepTimeout => {
                if self.state == PowerState::Idle {
                    self.transition(PowerState::Sleep, ctx.now, ctx.stats);
                    self.pending = None;
                }
                Ok(())
            }
            EventKind::UserShutdown => {
                self.user_shutdown(ctx);
                Ok(())
            }
            EventKind::AdminOff => self.power_off(ctx),
            EventKind::AdminOn => self.power_on(ctx),
            EventKind::UserWake => Ok(()),
        }
    }

    /// Seconds spent in `IDLE` before sleeping, for inactivity that began
    /// at `busy_until`.
    fn sleep_delay(&self) -> f64 {
        match &self.timeouts {
            Some(table) => (table.at(ContextKey::at(self.busy_until)) - self.policy.idle_timeout).max(0.0),
            None => self.policy.sleep_timeout,
        }
    }

    fn time_to_sleep(&self) -> f64 {
        self.policy.idle_timeout + self.sleep_delay()
    }

    fn on_request(&mut self, request: Request, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        let resumed_by_user = match (self.state, self.off_cause) {
            (PowerState::Off, Some(OffCause::User)) => true,
            (PowerState::Off, _) => {
                self.rejected += 1;
                ctx.stats.record(metric::REQUESTS_REJECTED, 1.0);
                trace!(computer = %self.name, t = ctx.now, "request rejected while off");
                return Ok(());
            }
            _ => false,
        };
        if let Some(id) = self.pending.take() {
            ctx.cancel(id);
        }

        let gap = (ctx.now - self.busy_until).max(0.0);
        // a user who switched the computer off expects to boot it
        let satisfaction = if resumed_by_user {
            1.0
        } else {
            weighted_user_satisfaction(gap, self.time_to_sleep(), self.satisfaction_threshold)
        };
        let latency = match self.state {
            PowerState::Sleep | PowerState::Off => self.policy.wake_latency,
            _ => 0.0,
        };
        if self.state != PowerState::Active {
            if self.state != PowerState::Idle {
                ctx.stats.record(metric::WAKE_LATENCY_SECONDS, latency);
            }
            self.transition(PowerState::Active, ctx.now, ctx.stats);
        }

        let service = request.service_secs.unwrap_or(0.0).max(0.0);
        self.busy_until = (ctx.now + latency).max(self.busy_until) + service;
        self.served += 1;
        ctx.stats.record(metric::USER_SATISFACTION, satisfaction);
        ctx.stats.record(metric::REQUESTS_SERVED, 1.0);
        ctx.stats.record(metric::SERVICE_SECONDS, service);

        self.pending = Some(ctx.schedule_at(
            self.busy_until + self.policy.idle_timeout,
            self.id,
            EventKind::IdleTimeout,
        )?);
        Ok(())
    }

    fn user_shutdown(&mut self, ctx: &mut EventContext<'_>) {
        if self.state == PowerState::Off {
            return;
        }
        if let Some(id) = self.pending.take() {
            ctx.cancel(id);
        }
        self.transition(PowerState::Off, ctx.now, ctx.stats);
        self.off_cause = Some(OffCause::User);
        self.user_shutdowns += 1;
        ctx.stats.record(metric::USER_SHUTDOWNS, 1.0);
    }

    fn power_off(&mut self, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        match (self.state, self.off_cause) {
            (PowerState::Off, Some(OffCause::Admin)) => return Ok(()),
            // already off by the user: the schedule takes over from here
            (PowerState::Off, _) => self.close_state(ctx.now, ctx.stats),
            _ => {
                if let Some(id) = self.pending.take() {
                    ctx.cancel(id);
                }
                self.transition(PowerState::Off, ctx.now, ctx.stats);
            }
        }
        self.off_cause = Some(OffCause::Admin);
        if let Some(wh) = self.working_hours {
            ctx.schedule_at(wh.next_on_after(ctx.now), self.id, EventKind::AdminOn)?;
        }
        Ok(())
    }

    fn power_on(&mut self, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        if self.off_cause != Some(OffCause::Admin) {
            return Ok(());
        }
        self.transition(PowerState::Active, ctx.now, ctx.stats);
        self.busy_until = ctx.now;
        self.pending = Some(ctx.schedule_self(self.policy.idle_timeout, EventKind::IdleTimeout)?);
        if let Some(wh) = self.working_hours {
            ctx.schedule_at(wh.next_off_after(ctx.now), self.id, EventKind::AdminOff)?;
        }
        Ok(())
    }

    fn transition(&mut self, to: PowerState, now: f64, stats: &mut Stats) {
        trace!(computer = %self.name, t = now, from = ?self.state, to = ?to, "transition");
        self.close_state(now, stats);
        self.transitions += 1;
        stats.record(metric::TRANSITIONS_COUNT, 1.0);
        self.state = to;
        if to != PowerState::Off {
            self.off_cause = None;
        }
    }

    /// Books the time spent in the current state up to `now`. Off time is
    /// also booked under its cause.
    fn close_state(&mut self, now: f64, stats: &mut Stats) {
        let elapsed = now - self.entered_at;
        let joules = self.power.watts(self.state) * elapsed;
        self.time_in_state[self.state.index()] += elapsed;
        self.energy_joules += joules;
        stats.record(self.state.seconds_metric(), elapsed);
        stats.record(metric::ENERGY_JOULES, joules);
        if let Some(cause) = self.off_cause.filter(|_| self.state == PowerState::Off) {
            stats.record(cause.seconds_metric(), elapsed);
        }
        self.entered_at = now;
    }

    /// Books the final partial state at the end of a run. Not a transition.
    pub fn flush(&mut self, horizon: f64, stats: &mut Stats) {
        if horizon > self.entered_at {
            self.close_state(horizon, stats);
        }
    }

    pub fn summary(&self) -> ComputerSummary {
        let secs = |s: PowerState| self.time_in_state[s.index()];
        ComputerSummary {
            name: self.name.clone(),
            final_state: self.state,
            active_secs: secs(PowerState::Active),
            idle_secs: secs(PowerState::Idle),
            sleep_secs: secs(PowerState::Sleep),
            off_secs: secs(PowerState::Off),
            energy_joules: self.energy_joules,
            transitions: self.transitions,
            requests_served: self.served,
            requests_rejected: self.rejected,
            user_shutdowns: self.user_shutdowns,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::sim::clock::Scheduler;
    use crate::sim::event::SimEvent;

    const POWER: PowerDraw = PowerDraw {
        active_w: 100.0,
        idle_w: 60.0,
        sleep_w: 5.0,
        off_w: 1.0,
    };

    fn policy(wake_latency: f64) -> PowerPolicy {
        PowerPolicy {
            idle_timeout: 60.0,
            sleep_timeout: 120.0,
            wake_latency,
        }
    }

    fn request(t: f64, service: f64) -> (f64, EventKind) {
        let request = Request {
            origin: None,
            target: AgentId(0),
            created_at: t,
            service_secs: Some(service),
        };
        (t, EventKind::RequestArrival(request))
    }

    /// Runs a lone computer with scripted requests `(time, service)`.
    fn drive(computer: &mut Computer, requests: &[(f64, f64)], horizon: f64) -> Stats {
        let events: Vec<_> = requests.iter().map(|&(t, service)| request(t, service)).collect();
        drive_events(computer, events, horizon)
    }

    fn drive_events(computer: &mut Computer, events: Vec<(f64, EventKind)>, horizon: f64) -> Stats {
        let mut sched = Scheduler::new();
        let mut stats = Stats::with_catalogue(&[0.0, f64::INFINITY]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let id = computer.id();
        {
            let mut ctx = EventContext {
                now: 0.0,
                this: id,
                scheduler: &mut sched,
                stats: &mut stats,
                rng: &mut rng,
            };
            computer.start(&mut ctx).unwrap();
        }
        for (t, kind) in events {
            sched.schedule_at(t, SimEvent { target: id, kind }).unwrap();
        }
        sched
            .run_until(horizon, |s, ev| {
                let mut ctx = EventContext {
                    now: s.now(),
                    this: ev.target,
                    scheduler: s,
                    stats: &mut stats,
                    rng: &mut rng,
                };
                computer.on_event(ev.kind, &mut ctx)
            })
            .unwrap();
        computer.flush(horizon, &mut stats);
        stats
    }

    #[test]
    fn cold_start_decays_to_sleep() {
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, None).unwrap();
        let stats = drive(&mut c, &[], 3_600.0);
        let s = c.summary();
        assert_eq!(s.transitions, 2);
        assert_eq!(s.active_secs, 60.0);
        assert_eq!(s.idle_secs, 120.0);
        assert_eq!(s.sleep_secs, 3_420.0);
        assert_eq!(s.final_state, PowerState::Sleep);
        assert_eq!(stats.get(metric::TRANSITIONS_COUNT).map(|a| a.sum()), Some(2.0));
    }

    #[test]
    fn request_during_idle_cancels_sleep() {
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, None).unwrap();
        drive(&mut c, &[(179.0, 0.0)], 300.0);
        let s = c.summary();
        assert_eq!(s.sleep_secs, 0.0);
        // idle at 60, active at 179, idle again at 239
        assert_eq!(s.transitions, 3);
        assert_eq!(s.final_state, PowerState::Idle);
        assert_eq!(s.active_secs, 60.0 + 60.0);
        assert_eq!(s.idle_secs, 119.0 + 61.0);
    }

    #[test]
    fn wake_from_sleep_pays_latency() {
        let mut c = Computer::new(AgentId(0), "pc", policy(5.0), POWER, None).unwrap();
        let stats = drive(&mut c, &[(500.0, 10.0)], 1_000.0);
        let s = c.summary();
        // sleep at 180, woken at 500, busy until 515, idle at 575, sleep at 695
        assert_eq!(s.transitions, 5);
        assert_eq!(s.active_secs, 60.0 + 75.0);
        assert_eq!(s.idle_secs, 240.0);
        assert_eq!(s.sleep_secs, 320.0 + 305.0);
        assert_eq!(stats.get(metric::WAKE_LATENCY_SECONDS).map(|a| a.sum()), Some(5.0));
        // 500 s since going quiet, asleep after 180 s: 320 s past the grace window
        assert_eq!(stats.get(metric::USER_SATISFACTION).map(|a| a.sum()), Some(1.0));
    }

    #[test]
    fn quick_return_after_sleep_is_unsatisfying() {
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, None).unwrap();
        let stats = drive(&mut c, &[(200.0, 0.0)], 400.0);
        assert_eq!(stats.get(metric::USER_SATISFACTION).map(|a| a.sum()), Some(0.0));
    }

    #[test]
    fn energy_matches_time_in_state() {
        let mut c = Computer::new(AgentId(0), "pc", policy(2.0), POWER, None).unwrap();
        let requests = [(10.0, 5.0), (30.0, 1.0), (400.0, 20.0), (2_000.0, 3.0)];
        let stats = drive(&mut c, &requests, 3_000.0);
        let s = c.summary();
        assert!((s.total_secs() - 3_000.0).abs() < 1e-9);
        let expected = s.active_secs * POWER.active_w
            + s.idle_secs * POWER.idle_w
            + s.sleep_secs * POWER.sleep_w
            + s.off_secs * POWER.off_w;
        assert!((s.energy_joules - expected).abs() < 1e-6);
        let recorded = stats.get(metric::ENERGY_JOULES).map_or(0.0, |a| a.sum());
        assert!((recorded - expected).abs() < 1e-6);
        assert_eq!(s.requests_served, 4);
    }

    #[test]
    fn working_hours_switch_off_and_reject() {
        let wh = WorkingHours {
            on_hour: 8,
            off_hour: 18,
            weekdays_only: false,
        };
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, Some(wh)).unwrap();
        // 02:00 is outside working hours
        let stats = drive(&mut c, &[(7_200.0, 1.0), (36_000.0, 1.0)], 40_000.0);
        let s = c.summary();
        assert_eq!(s.requests_rejected, 1);
        assert_eq!(s.requests_served, 1);
        // off from 0 to 08:00
        assert_eq!(s.off_secs, 8.0 * 3_600.0);
        assert_eq!(stats.get(metric::REQUESTS_REJECTED).map(|a| a.count()), Some(1));
    }

    #[test]
    fn invalid_timeouts_rejected() {
        let bad = PowerPolicy {
            sleep_timeout: -1.0,
            ..policy(0.0)
        };
        let err = Computer::new(AgentId(0), "pc", bad, POWER, None).unwrap_err();
        assert_eq!(err.field, "policy.sleep_timeout_secs");
        let bad = policy(f64::NAN);
        let err = Computer::new(AgentId(0), "pc", bad, POWER, None).unwrap_err();
        assert_eq!(err.field, "policy.wake_latency_secs");
    }

    #[test]
    fn user_shutdown_ends_with_next_request() {
        let mut c = Computer::new(AgentId(0), "pc", policy(5.0), POWER, None).unwrap();
        let events = vec![(30.0, EventKind::UserShutdown), request(1_030.0, 10.0)];
        let stats = drive_events(&mut c, events, 2_000.0);
        let s = c.summary();
        assert_eq!(s.user_shutdowns, 1);
        assert_eq!(s.requests_served, 1);
        assert_eq!(s.requests_rejected, 0);
        // active 0..30, off 30..1030, active until 1045 + 60, idle 120 s, asleep
        assert_eq!(s.off_secs, 1_000.0);
        assert_eq!(s.active_secs, 30.0 + 75.0);
        assert_eq!(s.idle_secs, 120.0);
        assert_eq!(stats.get(metric::USER_SHUTDOWN_SECONDS).map(|a| a.sum()), Some(1_000.0));
        assert_eq!(stats.get(metric::AUTO_SHUTDOWN_SECONDS).map(|a| a.count()), Some(0));
        assert_eq!(stats.get(metric::USER_SHUTDOWNS).map(|a| a.sum()), Some(1.0));
        assert_eq!(stats.get(metric::WAKE_LATENCY_SECONDS).map(|a| a.sum()), Some(5.0));
        assert_eq!(stats.get(metric::USER_SATISFACTION).map(|a| a.sum()), Some(1.0));
    }

    #[test]
    fn schedule_takes_over_a_user_shutdown() {
        let wh = WorkingHours {
            on_hour: 0,
            off_hour: 1,
            weekdays_only: false,
        };
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, Some(wh)).unwrap();
        // user off at 00:10; schedule off at 01:00; request at 02:00 is rejected
        let events = vec![(600.0, EventKind::UserShutdown), request(7_200.0, 1.0)];
        let stats = drive_events(&mut c, events, 10_000.0);
        let s = c.summary();
        assert_eq!(s.requests_rejected, 1);
        assert_eq!(s.off_secs, 10_000.0 - 600.0);
        assert_eq!(stats.get(metric::USER_SHUTDOWN_SECONDS).map(|a| a.sum()), Some(3_000.0));
        assert_eq!(stats.get(metric::AUTO_SHUTDOWN_SECONDS).map(|a| a.sum()), Some(6_400.0));
    }

    #[test]
    fn shutdown_while_off_is_ignored() {
        let wh = WorkingHours {
            on_hour: 8,
            off_hour: 18,
            weekdays_only: false,
        };
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, Some(wh)).unwrap();
        let stats = drive_events(&mut c, vec![(100.0, EventKind::UserShutdown)], 3_600.0);
        assert_eq!(c.summary().user_shutdowns, 0);
        assert_eq!(stats.get(metric::AUTO_SHUTDOWN_SECONDS).map(|a| a.sum()), Some(3_600.0));
    }

    #[test]
    fn tuned_timeouts_replace_sleep_timeout() {
        let table = Arc::new(TimeoutTable::uniform(600.0));
        let mut c = Computer::new(AgentId(0), "pc", policy(0.0), POWER, None)
            .unwrap()
            .with_timeouts(table);
        drive(&mut c, &[], 3_600.0);
        let s = c.summary();
        assert_eq!(s.active_secs, 60.0);
        assert_eq!(s.idle_secs, 540.0);
        assert_eq!(s.sleep_secs, 3_000.0);
    }
}
