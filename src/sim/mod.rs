//! Discrete-event engine: virtual-time scheduler, agents and the run that
//! ties them together.

pub mod agent;
/// Virtual-time priority queue with cancellation.
pub mod clock;
pub mod computer;
pub mod engine;
/// Events exchanged between agents.
pub mod event;
/// Power states, timeouts, working hours and user satisfaction.
pub mod policy;
pub mod user;

pub use agent::{Agent, EventContext};
pub use clock::{EventId, Scheduler};
pub use computer::{Computer, ComputerSummary};
pub use engine::{RunResult, Simulation};
pub use event::{AgentId, EventKind, Request, SimEvent};
pub use policy::{PowerDraw, PowerPolicy, PowerState, WorkingHours};
pub use user::{SamplingBounds, User};
