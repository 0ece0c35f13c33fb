//! Request-generating user process.

use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use super::agent::EventContext;
use super::event::{AgentId, EventKind, Request};
use crate::activity::{ActivityModel, ContextKey, IntervalKind};
use crate::config::ConfigError;
use crate::error::SchedulingError;
use crate::stats::metric;

/// Shortest activity burst a user produces, in seconds.
pub const MIN_ACTIVITY_SECS: f64 = 0.1;

/// Ranges that sampled durations are confined to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingBounds {
    pub activity: (f64, f64),
    pub inactivity: (f64, f64),
    /// Range of user-initiated off periods.
    pub off: (f64, f64),
}

impl SamplingBounds {
    /// Activity in `[0.1, xmax]`, inactivity in `[xmin, min(xmax, noise_threshold)]`,
    /// off periods in `[xmin, xmax]`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a resulting range is empty or its lower
    /// end is not finite.
    pub fn new(xmin: f64, xmax: f64, noise_threshold: Option<f64>) -> Result<Self, ConfigError> {
        let upper = noise_threshold.map_or(xmax, |n| n.min(xmax));
        if !(xmin.is_finite() && xmin <= upper) {
            return Err(ConfigError::new(
                "trace.xmin",
                format!("inactivity range [{xmin}, {upper}] is empty"),
            ));
        }
        if xmax.is_nan() || xmax < MIN_ACTIVITY_SECS {
            return Err(ConfigError::new(
                "trace.xmax",
                format!("must be at least {MIN_ACTIVITY_SECS}"),
            ));
        }
        Ok(Self {
            activity: (MIN_ACTIVITY_SECS, xmax),
            inactivity: (xmin, upper),
            off: (xmin, xmax),
        })
    }

    fn get(&self, kind: IntervalKind) -> (f64, f64) {
        match kind {
            IntervalKind::Activity => self.activity,
            IntervalKind::Inactivity => self.inactivity,
        }
    }
}

impl Default for SamplingBounds {
    fn default() -> Self {
        Self {
            activity: (MIN_ACTIVITY_SECS, f64::INFINITY),
            inactivity: (0.0, f64::INFINITY),
            off: (0.0, f64::INFINITY),
        }
    }
}

/// A user working at one computer.
///
/// Alternates activity bursts and inactivity gaps drawn from the model for
/// the current time of week. Each burst is sent to the computer as a
/// request whose service time is the burst length.
///
/// Each hour the user may also switch the computer off. Entering a context
/// loads its expected shutdown count as a budget; every wake-up shuts down
/// with probability equal to the remaining budget, which then drops by one.
/// The request after the off period powers the computer back on.
#[derive(Debug, Clone)]
pub struct User {
    id: AgentId,
    computer: AgentId,
    model: Arc<ActivityModel>,
    bounds: SamplingBounds,
    budget_context: Option<ContextKey>,
    shutdown_budget: f64,
    /// The next wake-up ends an off period and always issues a request.
    resuming: bool,
}

impl User {
    pub fn new(id: AgentId, computer: AgentId, model: Arc<ActivityModel>, bounds: SamplingBounds) -> Self {
        Self {
            id,
            computer,
            model,
            bounds,
            budget_context: None,
            shutdown_budget: 0.0,
            resuming: false,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn computer(&self) -> AgentId {
        self.computer
    }

    /// Schedules the first request after an inactivity gap.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if the continuation cannot be scheduled.
    pub fn start(&mut self, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        let gap = self.gap_at(ctx.now, ctx);
        ctx.schedule_self(gap, EventKind::UserWake)?;
        Ok(())
    }

    /// Issues a request, or switches the computer off, on wake-up and
    /// schedules the next wake-up.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if a continuation cannot be scheduled.
    pub fn on_event(&mut self, kind: EventKind, ctx: &mut EventContext<'_>) -> Result<(), SchedulingError> {
        if kind != EventKind::UserWake {
            return Ok(());
        }
        if !std::mem::take(&mut self.resuming) {
            if let Some(off) = self.shutdown_due(ctx) {
                trace!(user = %self.id, t = ctx.now, off, "shutdown issued");
                ctx.schedule(0.0, self.computer, EventKind::UserShutdown)?;
                self.resuming = true;
                ctx.schedule_self(off, EventKind::UserWake)?;
                return Ok(());
            }
        }
        let service = self.draw(ContextKey::at(ctx.now), IntervalKind::Activity, ctx);
        let request = Request {
            origin: Some(self.id),
            target: self.computer,
            created_at: ctx.now,
            service_secs: Some(service),
        };
        trace!(user = %self.id, t = ctx.now, service, "request issued");
        ctx.schedule(0.0, self.computer, EventKind::RequestArrival(request))?;

        // the gap starts when the burst ends, possibly in another context
        let gap = self.gap_at(ctx.now + service, ctx);
        ctx.schedule_self(service + gap, EventKind::UserWake)?;
        Ok(())
    }

    /// Length of the off period if the user shuts down now.
    fn shutdown_due(&mut self, ctx: &mut EventContext<'_>) -> Option<f64> {
        let key = ContextKey::at(ctx.now);
        let profile = self.model.profile_for(key);
        if self.budget_context != Some(key) {
            self.budget_context = Some(key);
            self.shutdown_budget = profile.off_frequency;
        }
        if self.shutdown_budget <= 0.0 {
            return None;
        }
        let duration = profile.off_duration.as_ref()?;
        if self.shutdown_budget <= ctx.rng.random::<f64>() {
            return None;
        }
        self.shutdown_budget -= 1.0;
        let (lo, hi) = self.bounds.off;
        Some(duration.sample_bounded(&mut *ctx.rng, lo, hi).round().max(lo))
    }

    fn gap_at(&self, time: f64, ctx: &mut EventContext<'_>) -> f64 {
        let gap = self.draw(ContextKey::at(time), IntervalKind::Inactivity, ctx);
        ctx.stats.record(metric::INACTIVITY_SECONDS, gap);
        gap
    }

    fn draw(&self, key: ContextKey, kind: IntervalKind, ctx: &mut EventContext<'_>) -> f64 {
        let (lo, hi) = self.bounds.get(kind);
        self.model
            .distribution_for(key, kind)
            .sample_bounded(&mut *ctx.rng, lo, hi)
    }
}
