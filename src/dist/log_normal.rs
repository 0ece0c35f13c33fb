//! Log-normal variates parameterised by the mean and standard deviation of
//! the resulting values rather than of their logarithm.

use rand::Rng;
use rand_distr::{Distribution as _, LogNormal};

use crate::error::InvalidDistributionError;

#[derive(Debug, Clone)]
pub struct MeanStdLogNormal {
    mean: f64,
    std_dev: f64,
    inner: LogNormal<f64>,
}

impl MeanStdLogNormal {
    /// Converts `(mean, std_dev)` to the underlying normal's `(mu, sigma)`:
    /// with `phi = sqrt(std_dev^2 + mean^2)`, `mu = ln(mean^2 / phi)` and
    /// `sigma = sqrt(ln(phi^2 / mean^2))`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` unless `mean > 0` and `std_dev >= 0`.
    pub fn new(mean: f64, std_dev: f64) -> Result<Self, InvalidDistributionError> {
        if !mean.is_finite() || mean <= 0.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "mean",
                reason: format!("must be finite and > 0, got {mean}"),
            });
        }
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "std_dev",
                reason: format!("must be finite and >= 0, got {std_dev}"),
            });
        }
        let phi = (std_dev.powi(2) + mean.powi(2)).sqrt();
        let mu = (mean.powi(2) / phi).ln();
        let sigma = (phi.powi(2) / mean.powi(2)).ln().sqrt();
        let inner = LogNormal::new(mu, sigma).map_err(|e| {
            InvalidDistributionError::InvalidParameter {
                name: "std_dev",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            mean,
            std_dev,
            inner,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.inner.sample(rng)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}
