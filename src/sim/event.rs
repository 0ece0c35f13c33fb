//! Events exchanged between agents.

use std::fmt;

use serde::Serialize;

/// Stable identity of an agent within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work sent from a user to a computer.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Issuing user; `None` for scripted requests.
    pub origin: Option<AgentId>,
    pub target: AgentId,
    /// Virtual time at which the request was issued.
    pub created_at: f64,
    /// Seconds of work the request keeps the computer busy.
    pub service_secs: Option<f64>,
}

/// What happens to the target agent when an event fires.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A user resumes after an inactivity gap and issues its next request.
    UserWake,
    RequestArrival(Request),
    /// `ACTIVE -> IDLE` countdown expired.
    IdleTimeout,
    /// `IDLE -> SLEEP` countdown expired.
    SleepTimeout,
    /// The user switches the computer off until their next request.
    UserShutdown,
    /// Working-hours policy powers the computer down.
    AdminOff,
    /// Working-hours policy powers the computer up.
    AdminOn,
}

/// An event addressed to one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    pub target: AgentId,
    pub kind: EventKind,
}
