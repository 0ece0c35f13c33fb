//! Closed set of simulation agents and the context handed to them when an
//! event fires.

use rand::rngs::StdRng;

use super::clock::{EventId, Scheduler};
use super::computer::Computer;
use super::event::{AgentId, EventKind, SimEvent};
use super::user::User;
use crate::error::SchedulingError;
use crate::stats::Stats;

/// Everything an agent may touch while handling one event.
///
/// Agents never hold references to the scheduler or the stats sink between
/// events; the engine lends them here for the duration of a callback.
pub struct EventContext<'a> {
    /// Virtual time of the event being handled.
    pub now: f64,
    /// Agent receiving the event.
    pub this: AgentId,
    pub scheduler: &'a mut Scheduler<SimEvent>,
    pub stats: &'a mut Stats,
    pub rng: &'a mut StdRng,
}

impl EventContext<'_> {
    /// Schedules `kind` for `target` after `delay` seconds.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` for a negative or non-finite delay.
    pub fn schedule(
        &mut self,
        delay: f64,
        target: AgentId,
        kind: EventKind,
    ) -> Result<EventId, SchedulingError> {
        self.scheduler.schedule(delay, SimEvent { target, kind })
    }

    /// Schedules `kind` for `target` at absolute time `time`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if `time` is in the past or non-finite.
    pub fn schedule_at(
        &mut self,
        time: f64,
        target: AgentId,
        kind: EventKind,
    ) -> Result<EventId, SchedulingError> {
        self.scheduler.schedule_at(time, SimEvent { target, kind })
    }

    /// Schedules `kind` for the receiving agent itself after `delay` seconds.
    ///
    /// # Errors
    ///
    /// See [`schedule`](Self::schedule).
    pub fn schedule_self(&mut self, delay: f64, kind: EventKind) -> Result<EventId, SchedulingError> {
        self.schedule(delay, self.this, kind)
    }

    /// Cancels an event this agent scheduled earlier.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }
}

/// A participant in the simulation.
#[derive(Debug)]
pub enum Agent {
    User(User),
    Computer(Computer),
}

impl Agent {
    /// Schedules the agent's first events. Called once at time zero.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if a continuation cannot be scheduled.
    pub fn start(&mut self, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        match self {
            Self::User(u) => u.start(ctx),
            Self::Computer(c) => c.start(ctx),
        }
    }

    /// Reacts to one event addressed to this agent.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if a continuation cannot be scheduled.
    pub fn on_event(&mut self, kind: EventKind, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        match self {
            Self::User(u) => u.on_event(kind, ctx),
            Self::Computer(c) => c.on_event(kind, ctx),
        }
    }

    pub fn as_computer(&self) -> Option<&Computer> {
        match self {
            Self::Computer(c) => Some(c),
            Self::User(_) => None,
        }
    }
}
