//! Bounded and unbounded power-law (Pareto type I) variates.

use rand::Rng;

use crate::error::InvalidDistributionError;

/// Power law with density proportional to `x^(-alpha)` on `[x_min, x_max]`.
///
/// `x_max = None` is the classic unbounded law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLaw {
    alpha: f64,
    x_min: f64,
    x_max: Option<f64>,
}

impl PowerLaw {
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` unless `alpha > 1`, `x_min > 0`
    /// and `x_max > x_min`, all finite.
    pub fn new(alpha: f64, x_min: f64, x_max: Option<f64>) -> Result<Self, InvalidDistributionError> {
        if !alpha.is_finite() || alpha <= 1.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "exponent",
                reason: format!("must be finite and > 1, got {alpha}"),
            });
        }
        if !x_min.is_finite() || x_min <= 0.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "x_min",
                reason: format!("must be finite and > 0, got {x_min}"),
            });
        }
        if let Some(hi) = x_max {
            if !hi.is_finite() || hi <= x_min {
                return Err(InvalidDistributionError::InvalidParameter {
                    name: "x_max",
                    reason: format!("must be finite and > x_min ({x_min}), got {hi}"),
                });
            }
        }
        Ok(Self {
            alpha,
            x_min,
            x_max,
        })
    }

    /// Maximum-likelihood exponent for the observations at or above `x_min`:
    /// `alpha = 1 + n / sum(ln(x / x_min))`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if no observation exceeds `x_min`.
    pub fn mle_exponent(data: &[f64], x_min: f64) -> Result<f64, InvalidDistributionError> {
        let tail: Vec<f64> = data.iter().copied().filter(|&x| x >= x_min).collect();
        if tail.is_empty() {
            return Err(InvalidDistributionError::Empty);
        }
        let log_sum: f64 = tail.iter().map(|x| (x / x_min).ln()).sum();
        if !log_sum.is_finite() || log_sum <= 0.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "exponent",
                reason: "cannot be estimated from data with no spread above x_min".into(),
            });
        }
        Ok(1.0 + tail.len() as f64 / log_sum)
    }

    /// Inverse-CDF sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let r = self.upper_ratio();
        let x = self.x_min * (1.0 - u * (1.0 - r)).powf(1.0 / (1.0 - self.alpha));
        match self.x_max {
            Some(hi) => x.min(hi),
            None => x,
        }
    }

    /// Analytic CDF.
    pub fn cdf(&self, x: f64) -> f64 {
        if x <= self.x_min {
            return 0.0;
        }
        if let Some(hi) = self.x_max {
            if x >= hi {
                return 1.0;
            }
        }
        let tail = (x / self.x_min).powf(1.0 - self.alpha);
        (1.0 - tail) / (1.0 - self.upper_ratio())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    pub fn x_max(&self) -> Option<f64> {
        self.x_max
    }

    /// `(x_max / x_min)^(1 - alpha)`, zero for the unbounded law.
    fn upper_ratio(&self) -> f64 {
        self.x_max
            .map_or(0.0, |hi| (hi / self.x_min).powf(1.0 - self.alpha))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn rejects_exponent_at_or_below_one() {
        assert!(PowerLaw::new(1.0, 1.0, None).is_err());
        assert!(PowerLaw::new(0.5, 1.0, None).is_err());
    }

    #[test]
    fn rejects_bad_cutoffs() {
        assert!(PowerLaw::new(2.0, 0.0, None).is_err());
        assert!(PowerLaw::new(2.0, 5.0, Some(5.0)).is_err());
    }

    #[test]
    fn cdf_endpoints() {
        let p = PowerLaw::new(2.5, 10.0, Some(100.0)).unwrap();
        assert_eq!(p.cdf(10.0), 0.0);
        assert_eq!(p.cdf(100.0), 1.0);
        let mid = p.cdf(30.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn bounded_samples_stay_in_range() {
        let p = PowerLaw::new(1.5, 2.0, Some(50.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10_000 {
            let x = p.sample(&mut rng);
            assert!((2.0..=50.0).contains(&x), "sample {x} out of range");
        }
    }

    #[test]
    fn mle_recovers_exponent() {
        let truth = PowerLaw::new(2.5, 1.0, None).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let data: Vec<f64> = (0..50_000).map(|_| truth.sample(&mut rng)).collect();
        let alpha = PowerLaw::mle_exponent(&data, 1.0).unwrap();
        assert!((alpha - 2.5).abs() < 0.05, "alpha {alpha}");
    }

    #[test]
    fn mle_without_spread_fails() {
        assert!(PowerLaw::mle_exponent(&[3.0, 3.0], 3.0).is_err());
        assert_eq!(
            PowerLaw::mle_exponent(&[1.0], 2.0),
            Err(InvalidDistributionError::Empty)
        );
    }
}
