//! Sampleable random processes built from historical data or parameters.
//!
//! A [`Distribution`] is immutable once constructed; sampling is a pure
//! function of its parameters and the caller's random source, so a seeded
//! RNG reproduces the same variates.
//!
//! # Examples
//!
//! ```
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//! use fleet_power_sim::dist::Distribution;
//!
//! let d = Distribution::from_empirical(&[1.0, 2.0, 2.5, 4.0]).unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! let x = d.sample(&mut rng);
//! assert!((1.0..=4.0).contains(&x));
//! ```

pub mod cache;
pub mod composite;
pub mod empirical;
pub mod fit;
pub mod kde;
pub mod log_normal;
pub mod power_law;

use std::sync::Arc;

use rand::Rng;

pub use cache::{DistributionCache, DistributionKey};
pub use composite::Mixture;
pub use empirical::{EmpiricalHistogram, MAX_BINS};
pub use fit::{FitPolicy, PowerLawFit};
pub use kde::KernelDensity;
pub use log_normal::MeanStdLogNormal;
pub use power_law::PowerLaw;

use crate::error::InvalidDistributionError;

/// Draws rejected by [`Distribution::sample_bounded`] before it clamps.
pub const MAX_BOUNDED_ATTEMPTS: usize = 100;

/// A random process that can be sampled for a non-negative duration.
#[derive(Debug, Clone)]
pub enum Distribution {
    /// Binned observations.
    Empirical(EmpiricalHistogram),
    /// Smoothed observations.
    Kde(KernelDensity),
    PowerLaw(PowerLaw),
    LogNormal(MeanStdLogNormal),
    /// Weighted mixture of children.
    Composite(Mixture),
}

impl Distribution {
    /// Histogram over `data` with square-root-rule binning.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if `data` is empty or non-finite.
    pub fn from_empirical(data: &[f64]) -> Result<Self, InvalidDistributionError> {
        EmpiricalHistogram::from_data(data, 0).map(Self::Empirical)
    }

    /// Unbounded power law with density proportional to `x^(-exponent)`
    /// above `x_min`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` unless `exponent > 1` and `x_min > 0`.
    pub fn from_power_law(exponent: f64, x_min: f64) -> Result<Self, InvalidDistributionError> {
        PowerLaw::new(exponent, x_min, None).map(Self::PowerLaw)
    }

    /// Power law truncated to `[x_min, x_max]`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` for invalid exponent or cutoffs.
    pub fn from_bounded_power_law(
        exponent: f64,
        x_min: f64,
        x_max: f64,
    ) -> Result<Self, InvalidDistributionError> {
        PowerLaw::new(exponent, x_min, Some(x_max)).map(Self::PowerLaw)
    }

    /// Gaussian KDE; `bandwidth = None` uses Silverman's rule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` for empty data or a bad bandwidth.
    pub fn from_kde(data: &[f64], bandwidth: Option<f64>) -> Result<Self, InvalidDistributionError> {
        KernelDensity::new(data, bandwidth).map(Self::Kde)
    }

    /// Log-normal with the given mean and standard deviation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` unless `mean > 0` and `std_dev >= 0`.
    pub fn from_log_normal(mean: f64, std_dev: f64) -> Result<Self, InvalidDistributionError> {
        MeanStdLogNormal::new(mean, std_dev).map(Self::LogNormal)
    }

    /// Mixture choosing child `i` with probability `weights[i] / sum(weights)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` on empty input, a length mismatch,
    /// or invalid weights.
    pub fn combine(
        distributions: Vec<Arc<Distribution>>,
        weights: Vec<f64>,
    ) -> Result<Self, InvalidDistributionError> {
        Mixture::new(distributions, weights).map(Self::Composite)
    }

    /// Draws one variate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Empirical(h) => h.sample(rng),
            Self::Kde(k) => k.sample(rng),
            Self::PowerLaw(p) => p.sample(rng),
            Self::LogNormal(l) => l.sample(rng),
            Self::Composite(m) => m.sample(rng),
        }
    }

    /// Draws until a variate lands in `[lo, hi]`, clamping the last draw
    /// after [`MAX_BOUNDED_ATTEMPTS`] rejections.
    pub fn sample_bounded<R: Rng + ?Sized>(&self, rng: &mut R, lo: f64, hi: f64) -> f64 {
        let mut x = self.sample(rng);
        for _ in 1..MAX_BOUNDED_ATTEMPTS {
            if (lo..=hi).contains(&x) {
                return x;
            }
            x = self.sample(rng);
        }
        x.clamp(lo, hi)
    }

    /// Short variant tag used in logs and cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Empirical(_) => "empirical-histogram",
            Self::Kde(_) => "kernel-density",
            Self::PowerLaw(_) => "power-law",
            Self::LogNormal(_) => "log-normal",
            Self::Composite(_) => "composite",
        }
    }

    /// Canonical parameter tuple identifying this distribution.
    pub fn key(&self) -> DistributionKey {
        DistributionKey::of(self)
    }
}
