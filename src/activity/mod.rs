//! Mapping from wall-clock context (day of week, hour of day) to the
//! distributions that drive a user's request timing.

pub mod fleet;
pub mod trace;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::dist::{Distribution, DistributionCache, FitPolicy};
use crate::error::InvalidDistributionError;

pub use fleet::{Fleet, FleetMember, ModelOptions, SyntheticFleet};
pub use trace::{TraceDataset, TraceFilter};

/// Seconds per hour of virtual time.
pub const HOUR: f64 = 3_600.0;
/// Seconds per day of virtual time.
pub const DAY: f64 = 24.0 * HOUR;
/// Seconds per week of virtual time.
pub const WEEK: f64 = 7.0 * DAY;
/// Number of distinct activity contexts.
pub const CONTEXTS: usize = 7 * 24;

/// Day names indexed by [`ContextKey::day`]; virtual time zero is Sunday 00:00.
pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Discretised time-of-week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextKey {
    /// Day of week, Sunday = 0.
    pub day: u8,
    /// Hour of day, 0..24.
    pub hour: u8,
}

impl ContextKey {
    /// Returns `None` if `day >= 7` or `hour >= 24`.
    pub fn new(day: u8, hour: u8) -> Option<Self> {
        (day < 7 && hour < 24).then_some(Self { day, hour })
    }

    /// Context active at virtual time `time` (seconds), wrapping weekly.
    pub fn at(time: f64) -> Self {
        let t = time.rem_euclid(WEEK);
        Self {
            day: ((t / DAY) as u8).min(6),
            hour: (((t % DAY) / HOUR) as u8).min(23),
        }
    }

    /// Parses a day name such as `"Monday"`.
    pub fn day_from_name(name: &str) -> Option<u8> {
        DAY_NAMES.iter().position(|d| *d == name).map(|i| i as u8)
    }

    /// Dense index in `0..CONTEXTS`.
    pub fn index(self) -> usize {
        usize::from(self.day) * 24 + usize::from(self.hour)
    }

    /// The hour before this one, wrapping from Sunday 00:00 to Saturday 23:00.
    pub fn previous(self) -> Self {
        if self.hour > 0 {
            Self {
                day: self.day,
                hour: self.hour - 1,
            }
        } else {
            Self {
                day: (self.day + 6) % 7,
                hour: 23,
            }
        }
    }

    /// Every context in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..7).flat_map(|day| (0..24).map(move |hour| Self { day, hour }))
    }

    /// `true` Monday through Friday.
    pub fn is_weekday(self) -> bool {
        (1..=5).contains(&self.day)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:00", DAY_NAMES[usize::from(self.day)], self.hour)
    }
}

/// Which of a context's two distributions to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    /// Length of a burst of activity, used as a request's service duration.
    Activity,
    /// Gap between the end of one burst and the next request.
    Inactivity,
}

/// Distributions in effect for one context.
#[derive(Debug, Clone)]
pub struct ActivityProfile {
    pub activity: Arc<Distribution>,
    pub inactivity: Arc<Distribution>,
    /// Length of the off periods a user starts, if any were observed.
    pub off_duration: Option<Arc<Distribution>>,
    /// Expected user shutdowns per hour in this context.
    pub off_frequency: f64,
}

impl ActivityProfile {
    /// Profile whose user never shuts the computer down.
    pub fn new(activity: Arc<Distribution>, inactivity: Arc<Distribution>) -> Self {
        Self {
            activity,
            inactivity,
            off_duration: None,
            off_frequency: 0.0,
        }
    }

    pub fn with_shutdowns(mut self, off_duration: Arc<Distribution>, off_frequency: f64) -> Self {
        self.off_duration = Some(off_duration);
        self.off_frequency = off_frequency;
        self
    }

    pub fn get(&self, kind: IntervalKind) -> &Arc<Distribution> {
        match kind {
            IntervalKind::Activity => &self.activity,
            IntervalKind::Inactivity => &self.inactivity,
        }
    }
}

/// Raw interval observations for one context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSamples {
    pub activity: Vec<f64>,
    pub inactivity: Vec<f64>,
    /// Lengths of user-initiated off periods.
    pub off_durations: Vec<f64>,
    /// Observed shutdowns per hour, one value per recorded hour.
    pub off_fractions: Vec<f64>,
}

impl IntervalSamples {
    /// Both kinds observed.
    pub fn is_complete(&self) -> bool {
        !self.activity.is_empty() && !self.inactivity.is_empty()
    }

    pub fn extend(&mut self, other: &Self) {
        self.activity.extend_from_slice(&other.activity);
        self.inactivity.extend_from_slice(&other.inactivity);
        self.off_durations.extend_from_slice(&other.off_durations);
        self.off_fractions.extend_from_slice(&other.off_fractions);
    }
}

/// Observations grouped by context.
pub type ContextSamples = BTreeMap<ContextKey, IntervalSamples>;

/// Pools every context of `samples` into one set.
pub fn pool(samples: &ContextSamples) -> IntervalSamples {
    let mut pooled = IntervalSamples::default();
    for s in samples.values() {
        pooled.extend(s);
    }
    pooled
}

/// Resolution for contexts without observations of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Use the profile fitted over all observed contexts.
    #[default]
    Aggregate,
    /// Walk back hour by hour (up to a week) to the nearest observed context,
    /// then the aggregate.
    PreviousHour,
}

/// Total lookup table from [`ContextKey`] to an [`ActivityProfile`].
///
/// Fallbacks are resolved at construction, so every lookup is an index.
#[derive(Debug, Clone)]
pub struct ActivityModel {
    table: Vec<ActivityProfile>,
    aggregate: ActivityProfile,
    observed: usize,
}

impl ActivityModel {
    /// Model that answers every context with the same profile.
    pub fn uniform(profile: ActivityProfile) -> Self {
        Self {
            table: vec![profile.clone(); CONTEXTS],
            aggregate: profile,
            observed: CONTEXTS,
        }
    }

    /// Fits one profile per complete context of `samples` and resolves the
    /// rest through `fallback`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if no activity or no inactivity
    /// observation exists at all, or if fitting a context fails.
    pub fn build(
        samples: &ContextSamples,
        fit: &FitPolicy,
        fallback: FallbackPolicy,
        cache: &mut DistributionCache,
    ) -> Result<Self, InvalidDistributionError> {
        let aggregate = fit_profile(&pool(samples), fit, cache, None)?;

        let mut fitted: Vec<Option<ActivityProfile>> = vec![None; CONTEXTS];
        for (key, s) in samples.iter().filter(|(_, s)| s.is_complete()) {
            fitted[key.index()] = Some(fit_profile(s, fit, cache, aggregate.off_duration.as_ref())?);
        }
        let observed = fitted.iter().filter(|p| p.is_some()).count();

        let table = ContextKey::all()
            .map(|key| resolve(&fitted, key, fallback).unwrap_or_else(|| aggregate.clone()))
            .collect();

        debug!(observed, cached = cache.len(), "activity model built");
        Ok(Self {
            table,
            aggregate,
            observed,
        })
    }

    /// Same as [`build`](Self::build) after pooling every context into one.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_collapsed(
        samples: &ContextSamples,
        fit: &FitPolicy,
        cache: &mut DistributionCache,
    ) -> Result<Self, InvalidDistributionError> {
        fit_profile(&pool(samples), fit, cache, None).map(Self::uniform)
    }

    /// Profile for `key`; never fails.
    pub fn profile_for(&self, key: ContextKey) -> &ActivityProfile {
        &self.table[key.index()]
    }

    /// Distribution of `kind` for `key`; never fails.
    pub fn distribution_for(&self, key: ContextKey, kind: IntervalKind) -> &Arc<Distribution> {
        self.profile_for(key).get(kind)
    }

    /// Profile fitted over every observation.
    pub fn aggregate(&self) -> &ActivityProfile {
        &self.aggregate
    }

    /// Number of contexts backed by their own observations.
    pub fn observed_contexts(&self) -> usize {
        self.observed
    }
}

/// Contexts with shutdown frequencies but no off durations of their own
/// borrow `shared_off`.
fn fit_profile(
    samples: &IntervalSamples,
    fit: &FitPolicy,
    cache: &mut DistributionCache,
    shared_off: Option<&Arc<Distribution>>,
) -> Result<ActivityProfile, InvalidDistributionError> {
    let profile = ActivityProfile::new(
        cache.intern(fit.fit(&samples.activity)?),
        cache.intern(fit.fit(&samples.inactivity)?),
    );
    let off_duration = if samples.off_durations.is_empty() {
        shared_off.cloned()
    } else {
        Some(cache.intern(fit.fit(&samples.off_durations)?))
    };
    Ok(ActivityProfile {
        off_duration,
        off_frequency: mean(&samples.off_fractions),
        ..profile
    })
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Inactivity gaps a computer's timeouts are tuned on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingGaps {
    /// Gaps per context; empty when tuning ignores the hour of week.
    pub by_context: BTreeMap<ContextKey, Vec<f64>>,
    /// Every gap, the fallback for contexts without their own.
    pub all: Vec<f64>,
}

impl TrainingGaps {
    /// Gaps from `samples`, kept per context only if `per_hour`.
    pub fn from_samples(samples: &ContextSamples, per_hour: bool) -> Self {
        let by_context = if per_hour {
            samples
                .iter()
                .filter(|(_, s)| !s.inactivity.is_empty())
                .map(|(k, s)| (*k, s.inactivity.clone()))
                .collect()
        } else {
            BTreeMap::new()
        };
        Self {
            by_context,
            all: pool(samples).inactivity,
        }
    }

    /// Context-free gaps.
    pub fn pooled(all: Vec<f64>) -> Self {
        Self {
            by_context: BTreeMap::new(),
            all,
        }
    }

    /// Gaps for `key`, falling back to every gap.
    pub fn for_context(&self, key: ContextKey) -> &[f64] {
        self.by_context.get(&key).map_or(&self.all, Vec::as_slice)
    }
}

fn resolve(
    fitted: &[Option<ActivityProfile>],
    key: ContextKey,
    fallback: FallbackPolicy,
) -> Option<ActivityProfile> {
    if let Some(p) = &fitted[key.index()] {
        return Some(p.clone());
    }
    match fallback {
        FallbackPolicy::Aggregate => None,
        FallbackPolicy::PreviousHour => {
            let mut k = key;
            for _ in 0..CONTEXTS {
                k = k.previous();
                if let Some(p) = &fitted[k.index()] {
                    return Some(p.clone());
                }
            }
            None
        }
    }
}
