//! Power-management policy: per-state draw, timeouts, working hours and
//! the user-satisfaction model used to tune timeouts.

use serde::Serialize;

use crate::activity::{CONTEXTS, ContextKey, DAY, HOUR, TrainingGaps, WEEK};

/// Seconds after falling asleep within which a returning user is always
/// counted as dissatisfied.
pub const SATISFACTION_GRACE_SECS: f64 = 60.0;

/// Bisection stops once the bracket is narrower than this.
const TIMEOUT_TOLERANCE_SECS: f64 = 1.0;

/// Computer power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    Active,
    Idle,
    Sleep,
    Off,
}

impl PowerState {
    pub const ALL: [Self; 4] = [Self::Active, Self::Idle, Self::Sleep, Self::Off];

    pub fn index(self) -> usize {
        match self {
            Self::Active => 0,
            Self::Idle => 1,
            Self::Sleep => 2,
            Self::Off => 3,
        }
    }

    /// Stats metric receiving time spent in this state.
    pub fn seconds_metric(self) -> &'static str {
        use crate::stats::metric;
        match self {
            Self::Active => metric::ACTIVE_SECONDS,
            Self::Idle => metric::IDLE_SECONDS,
            Self::Sleep => metric::SLEEP_SECONDS,
            Self::Off => metric::OFF_SECONDS,
        }
    }
}

/// Watts drawn in each power state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerDraw {
    pub active_w: f64,
    pub idle_w: f64,
    pub sleep_w: f64,
    pub off_w: f64,
}

impl PowerDraw {
    pub fn watts(&self, state: PowerState) -> f64 {
        match state {
            PowerState::Active => self.active_w,
            PowerState::Idle => self.idle_w,
            PowerState::Sleep => self.sleep_w,
            PowerState::Off => self.off_w,
        }
    }
}

/// Inactivity timeouts and wake cost of one computer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerPolicy {
    /// Seconds after the last served request before `ACTIVE -> IDLE`.
    pub idle_timeout: f64,
    /// Seconds after entering `IDLE` before `IDLE -> SLEEP`.
    pub sleep_timeout: f64,
    /// Seconds a request waits while a sleeping computer resumes.
    pub wake_latency: f64,
}

impl PowerPolicy {
    /// Inactivity after which the computer is asleep.
    pub fn time_to_sleep(&self) -> f64 {
        self.idle_timeout + self.sleep_timeout
    }
}

/// Administrative on/off schedule.
///
/// Computers are on from `on_hour` to `off_hour` each eligible day and off
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkingHours {
    pub on_hour: u8,
    pub off_hour: u8,
    /// Only Monday through Friday are eligible.
    pub weekdays_only: bool,
}

impl WorkingHours {
    pub fn is_working(&self, time: f64) -> bool {
        let key = ContextKey::at(time);
        self.eligible(key) && (self.on_hour..self.off_hour).contains(&key.hour)
    }

    /// First power-on instant strictly after `time`.
    pub fn next_on_after(&self, time: f64) -> f64 {
        self.next_after(time, self.on_hour)
    }

    /// First power-off instant strictly after `time`.
    pub fn next_off_after(&self, time: f64) -> f64 {
        self.next_after(time, self.off_hour)
    }

    fn eligible(&self, key: ContextKey) -> bool {
        !self.weekdays_only || key.is_weekday()
    }

    fn next_after(&self, time: f64, hour: u8) -> f64 {
        let today = (time / DAY).floor();
        // an eligible day always occurs within a week
        (0..8)
            .map(|d| (today + f64::from(d)) * DAY)
            .filter(|&day_start| self.eligible(ContextKey::at(day_start)))
            .map(|day_start| day_start + f64::from(hour) * HOUR)
            .find(|&t| t > time)
            .unwrap_or(time + WEEK)
    }
}

/// `clamp((ip - x) / (ip - fp), 0, 1)`: linear ramp between `ip` and `fp`.
pub fn weight(x: f64, ip: f64, fp: f64) -> f64 {
    ((ip - x) / (ip - fp)).clamp(0.0, 1.0)
}

/// Satisfaction of a user returning after `gap` seconds to a computer that
/// sleeps after `timeout` seconds of inactivity.
///
/// Returns 1 if the computer was still awake. Otherwise the score ramps from
/// 0 for a return within [`SATISFACTION_GRACE_SECS`] of falling asleep up to
/// 1 for a return `threshold` seconds after.
pub fn weighted_user_satisfaction(gap: f64, timeout: f64, threshold: f64) -> f64 {
    if gap < timeout {
        1.0
    } else {
        weight(gap - timeout, SATISFACTION_GRACE_SECS, threshold)
    }
}

/// Mean satisfaction over `gaps`, 1 for an empty set.
pub fn mean_satisfaction(gaps: &[f64], timeout: f64, threshold: f64) -> f64 {
    if gaps.is_empty() {
        return 1.0;
    }
    gaps.iter()
        .map(|&g| weighted_user_satisfaction(g, timeout, threshold))
        .sum::<f64>()
        / gaps.len() as f64
}

/// Searches `[lo, hi]` for the time-to-sleep whose mean satisfaction over
/// `gaps` reaches `target_pct`.
///
/// Uses bisection to a 1 s tolerance. If the target is not bracketed the
/// bound whose satisfaction is closer to the target is returned.
pub fn optimal_timeout(gaps: &[f64], target_pct: f64, threshold: f64, lo: f64, hi: f64) -> f64 {
    let f = |x: f64| mean_satisfaction(gaps, x, threshold) * 100.0 - target_pct;
    let (mut a, mut b) = (lo, hi);
    let (fa, fb) = (f(a), f(b));
    if fa >= 0.0 {
        return lo;
    }
    if fb < 0.0 {
        return if fb > fa { hi } else { lo };
    }
    while b - a > TIMEOUT_TOLERANCE_SECS {
        let mid = 0.5 * (a + b);
        if f(mid) >= 0.0 {
            b = mid;
        } else {
            a = mid;
        }
    }
    b
}

/// What a tuned timeout has to achieve and where it may lie.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatisfactionTarget {
    /// Mean satisfaction to reach, in percent.
    pub target_pct: f64,
    pub threshold_secs: f64,
    /// Search interval for the time-to-sleep.
    pub lo: f64,
    pub hi: f64,
}

impl SatisfactionTarget {
    /// Shortest time-to-sleep in the search interval meeting the target on `gaps`.
    pub fn solve(&self, gaps: &[f64]) -> f64 {
        optimal_timeout(gaps, self.target_pct, self.threshold_secs, self.lo, self.hi)
    }
}

/// Time-to-sleep of one computer for every hour of the week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutTable {
    time_to_sleep: Vec<f64>,
}

impl TimeoutTable {
    pub fn uniform(time_to_sleep: f64) -> Self {
        Self {
            time_to_sleep: vec![time_to_sleep; CONTEXTS],
        }
    }

    /// Tunes every context on its own gaps. Contexts without gaps get the
    /// value tuned on all of them.
    pub fn tune(training: &TrainingGaps, target: &SatisfactionTarget) -> Self {
        let overall = target.solve(&training.all);
        let time_to_sleep = ContextKey::all()
            .map(|key| match training.by_context.get(&key) {
                Some(gaps) if !gaps.is_empty() => target.solve(gaps),
                _ => overall,
            })
            .collect();
        Self { time_to_sleep }
    }

    /// Time-to-sleep for inactivity starting in `key`.
    pub fn at(&self, key: ContextKey) -> f64 {
        self.time_to_sleep[key.index()]
    }

    /// Mean over the week.
    pub fn mean(&self) -> f64 {
        self.time_to_sleep.iter().sum::<f64>() / self.time_to_sleep.len() as f64
    }
}
