//! Simulation run that owns the agents, the event queue and the stats sink.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, trace};

use super::agent::{Agent, EventContext};
use super::clock::Scheduler;
use super::computer::{Computer, ComputerSummary, DEFAULT_SATISFACTION_THRESHOLD_SECS};
use super::event::{AgentId, EventKind, Request, SimEvent};
use super::policy::{PowerDraw, PowerPolicy, TimeoutTable, WorkingHours};
use super::user::{SamplingBounds, User};
use crate::activity::ActivityModel;
use crate::config::ConfigError;
use crate::error::SimError;
use crate::stats::Stats;

/// One self-contained simulation run.
///
/// Agents are added before [`run`](Self::run), which consumes the
/// simulation. Nothing is shared with other runs, so independent runs may
/// execute on different threads.
pub struct Simulation {
    horizon: f64,
    seed: u64,
    satisfaction_threshold: f64,
    agents: Vec<Agent>,
    scheduler: Scheduler<SimEvent>,
    stats: Stats,
}

/// Output of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stats: Stats,
    pub computers: Vec<ComputerSummary>,
    /// Events dispatched before the horizon.
    pub events: u64,
    pub horizon: f64,
}

impl Simulation {
    /// Creates an empty run.
    ///
    /// # Arguments
    ///
    /// * `horizon` - Virtual seconds to simulate
    /// * `seed` - Seed of the run's random stream
    /// * `duration_edges` - Bin edges of every duration histogram
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` if `horizon` is not finite and positive,
    /// or `SimError::Distribution` if `duration_edges` are not valid
    /// histogram edges.
    pub fn new(horizon: f64, seed: u64, duration_edges: &[f64]) -> Result<Self, SimError> {
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(ConfigError::new("simulation.horizon_secs", "must be finite and > 0").into());
        }
        Ok(Self {
            horizon,
            seed,
            satisfaction_threshold: DEFAULT_SATISFACTION_THRESHOLD_SECS,
            agents: Vec::new(),
            scheduler: Scheduler::new(),
            stats: Stats::with_catalogue(duration_edges)?,
        })
    }

    /// Return delay after sleep at which users are fully satisfied, applied
    /// to computers added afterwards.
    pub fn with_satisfaction_threshold(mut self, threshold_secs: f64) -> Self {
        self.satisfaction_threshold = threshold_secs;
        self
    }

    /// Adds a computer starting `ACTIVE` at time zero.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` for a negative or non-finite timeout.
    pub fn add_computer(
        &mut self,
        name: impl Into<String>,
        policy: PowerPolicy,
        power: PowerDraw,
        working_hours: Option<WorkingHours>,
    ) -> Result<AgentId, SimError> {
        self.insert_computer(name.into(), policy, power, working_hours, None)
    }

    /// Adds a computer whose time-to-sleep follows `timeouts` instead of
    /// `policy.sleep_timeout`.
    ///
    /// # Errors
    ///
    /// See [`add_computer`](Self::add_computer).
    pub fn add_tuned_computer(
        &mut self,
        name: impl Into<String>,
        policy: PowerPolicy,
        power: PowerDraw,
        working_hours: Option<WorkingHours>,
        timeouts: Arc<TimeoutTable>,
    ) -> Result<AgentId, SimError> {
        self.insert_computer(name.into(), policy, power, working_hours, Some(timeouts))
    }

    fn insert_computer(
        &mut self,
        name: String,
        policy: PowerPolicy,
        power: PowerDraw,
        working_hours: Option<WorkingHours>,
        timeouts: Option<Arc<TimeoutTable>>,
    ) -> Result<AgentId, SimError> {
        let id = AgentId(self.agents.len());
        let mut computer = Computer::new(id, name, policy, power, working_hours)?
            .with_satisfaction_threshold(self.satisfaction_threshold);
        if let Some(table) = timeouts {
            computer = computer.with_timeouts(table);
        }
        self.agents.push(Agent::Computer(computer));
        Ok(id)
    }

    /// Adds a user sending requests to `computer`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::UnknownAgent` or `SimError::NotAComputer` if
    /// `computer` does not name a computer of this run.
    pub fn add_user(
        &mut self,
        computer: AgentId,
        model: Arc<ActivityModel>,
        bounds: SamplingBounds,
    ) -> Result<AgentId, SimError> {
        self.ensure_computer(computer)?;
        let id = AgentId(self.agents.len());
        self.agents.push(Agent::User(User::new(id, computer, model, bounds)));
        Ok(id)
    }

    /// Schedules a request with no originating user.
    ///
    /// # Errors
    ///
    /// Returns `SimError` if `computer` is not a computer of this run or
    /// `at` is negative or non-finite.
    pub fn inject_request(&mut self, at: f64, computer: AgentId, service_secs: Option<f64>) -> Result<(), SimError> {
        self.ensure_computer(computer)?;
        let request = Request {
            origin: None,
            target: computer,
            created_at: at,
            service_secs,
        };
        self.scheduler.schedule_at(
            at,
            SimEvent {
                target: computer,
                kind: EventKind::RequestArrival(request),
            },
        )?;
        Ok(())
    }

    fn ensure_computer(&self, id: AgentId) -> Result<(), SimError> {
        match self.agents.get(id.0) {
            Some(Agent::Computer(_)) => Ok(()),
            Some(Agent::User(_)) => Err(SimError::NotAComputer(id)),
            None => Err(SimError::UnknownAgent(id)),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Runs the event loop to the horizon and flushes every computer.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Scheduling` if an agent tries to schedule into the
    /// past, or `SimError::UnknownAgent` for an event without a receiver.
    pub fn run(self) -> Result<RunResult, SimError> {
        let Self {
            horizon,
            seed,
            mut agents,
            mut scheduler,
            mut stats,
            ..
        } = self;
        let mut rng = StdRng::seed_from_u64(seed);
        info!(agents = agents.len(), horizon, seed, "run started");

        for (i, agent) in agents.iter_mut().enumerate() {
            let mut ctx = EventContext {
                now: scheduler.now(),
                this: AgentId(i),
                scheduler: &mut scheduler,
                stats: &mut stats,
                rng: &mut rng,
            };
            agent.start(&mut ctx)?;
        }

        let events = scheduler.run_until(horizon, |sched, event| -> Result<(), SimError> {
            let agent = agents
                .get_mut(event.target.0)
                .ok_or(SimError::UnknownAgent(event.target))?;
            trace!(t = sched.now(), target = %event.target, kind = ?event.kind, "dispatch");
            let mut ctx = EventContext {
                now: sched.now(),
                this: event.target,
                scheduler: sched,
                stats: &mut stats,
                rng: &mut rng,
            };
            agent.on_event(event.kind, &mut ctx)?;
            Ok(())
        })?;

        for agent in &mut agents {
            if let Agent::Computer(c) = agent {
                c.flush(horizon, &mut stats);
            }
        }
        debug!(pending = scheduler.len(), "events left at horizon");

        let computers: Vec<ComputerSummary> = agents
            .iter()
            .filter_map(Agent::as_computer)
            .map(Computer::summary)
            .collect();
        info!(events, computers = computers.len(), "run finished");
        Ok(RunResult {
            stats,
            computers,
            events,
            horizon,
        })
    }
}
