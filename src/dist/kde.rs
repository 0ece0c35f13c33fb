//! Gaussian kernel density sampling.

use rand::Rng;
use rand_distr::{Distribution as _, Normal};

use super::empirical::finite_range;
use crate::error::InvalidDistributionError;

/// Smoothed resampling of a data set: a uniformly chosen observation plus
/// Gaussian jitter with standard deviation `bandwidth`.
#[derive(Debug, Clone)]
pub struct KernelDensity {
    data: Vec<f64>,
    bandwidth: f64,
    kernel: Option<Normal<f64>>,
}

impl KernelDensity {
    /// Builds a KDE over `data`.
    ///
    /// `bandwidth = None` selects Silverman's rule of thumb. A zero bandwidth
    /// degenerates to plain bootstrap resampling.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` for empty or non-finite data, or a
    /// negative or non-finite bandwidth.
    pub fn new(data: &[f64], bandwidth: Option<f64>) -> Result<Self, InvalidDistributionError> {
        finite_range(data)?;
        let bandwidth = bandwidth.unwrap_or_else(|| silverman_bandwidth(data));
        if !bandwidth.is_finite() || bandwidth < 0.0 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "bandwidth",
                reason: format!("must be finite and >= 0, got {bandwidth}"),
            });
        }
        let kernel = if bandwidth > 0.0 {
            let normal = Normal::new(0.0, bandwidth).map_err(|e| {
                InvalidDistributionError::InvalidParameter {
                    name: "bandwidth",
                    reason: e.to_string(),
                }
            })?;
            Some(normal)
        } else {
            None
        };
        Ok(Self {
            data: data.to_vec(),
            bandwidth,
            kernel,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let base = self.data[rng.random_range(0..self.data.len())];
        match &self.kernel {
            Some(kernel) => base + kernel.sample(rng),
            None => base,
        }
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Silverman's rule: `0.9 * min(sd, IQR / 1.34) * n^(-1/5)`.
///
/// Falls back to the standard deviation when the IQR is zero.
pub fn silverman_bandwidth(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();

    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

    let spread = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
    0.9 * spread * n.powf(-0.2)
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
