//! Pluggable rules turning an observed data set into a [`Distribution`].

use tracing::debug;

use super::{Distribution, EmpiricalHistogram, KernelDensity, PowerLaw};
use super::empirical::finite_range;
use crate::error::InvalidDistributionError;

/// Default sample count under which [`FitPolicy::Auto`] smooths with a KDE.
pub const DEFAULT_KDE_BELOW: usize = 200;

/// How the power-law exponent is obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerLawFit {
    /// Maximum-likelihood estimate from the data.
    Mle,
    /// Fixed exponent; only the cutoffs come from the data.
    Fixed(f64),
}

/// Model-selection rule applied to every data set of the activity model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitPolicy {
    /// Histogram with `bins` bins (`0` for the square-root rule).
    Histogram { bins: usize },
    /// Gaussian KDE; `None` selects Silverman's bandwidth.
    Kde { bandwidth: Option<f64> },
    /// Power law bounded by the data's range.
    PowerLaw { fit: PowerLawFit },
    /// KDE for fewer than `kde_below` points, histogram otherwise.
    Auto { kde_below: usize, bins: usize },
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self::Auto {
            kde_below: DEFAULT_KDE_BELOW,
            bins: 0,
        }
    }
}

impl FitPolicy {
    /// Fits `data` according to this policy.
    ///
    /// A power-law fit over data with fewer than two distinct positive values
    /// falls back to a histogram, which for constant data is a point mass.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` for empty or non-finite data and
    /// for an invalid fixed exponent.
    pub fn fit(&self, data: &[f64]) -> Result<Distribution, InvalidDistributionError> {
        match *self {
            Self::Histogram { bins } => EmpiricalHistogram::from_data(data, bins).map(Distribution::Empirical),
            Self::Kde { bandwidth } => KernelDensity::new(data, bandwidth).map(Distribution::Kde),
            Self::PowerLaw { fit } => fit_power_law(data, fit),
            Self::Auto { kde_below, bins } => {
                if data.len() < kde_below {
                    KernelDensity::new(data, None).map(Distribution::Kde)
                } else {
                    EmpiricalHistogram::from_data(data, bins).map(Distribution::Empirical)
                }
            }
        }
    }
}

fn fit_power_law(data: &[f64], fit: PowerLawFit) -> Result<Distribution, InvalidDistributionError> {
    let (min, max) = finite_range(data)?;
    if min <= 0.0 || min == max {
        debug!(n = data.len(), "power-law fit degenerate, using histogram");
        return EmpiricalHistogram::from_data(data, 0).map(Distribution::Empirical);
    }
    let alpha = match fit {
        PowerLawFit::Mle => PowerLaw::mle_exponent(data, min)?,
        PowerLawFit::Fixed(alpha) => alpha,
    };
    PowerLaw::new(alpha, min, Some(max)).map(Distribution::PowerLaw)
}
