//! Empirical histogram sampled by categorical bin choice plus uniform
//! position within the bin.

use rand::Rng;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;

use crate::error::InvalidDistributionError;

/// Upper bound on the number of bins chosen by the square-root rule.
pub const MAX_AUTO_BINS: usize = 64;

/// Upper bound on an explicitly requested number of bins.
pub const MAX_BINS: usize = 10_000;

/// Histogram approximation of an observed data set.
///
/// Bin `i` covers `[edges[i], edges[i + 1])`, the last bin also covering its
/// upper edge. A data set whose values are all equal collapses to a single
/// zero-width bin that always yields that value.
#[derive(Debug, Clone)]
pub struct EmpiricalHistogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
    chooser: WeightedIndex<u64>,
}

impl EmpiricalHistogram {
    /// Bins `data` into `bins` equal-width bins spanning `[min, max]`.
    ///
    /// `bins == 0` selects the square-root rule, capped at [`MAX_AUTO_BINS`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if `data` is empty or holds a
    /// non-finite value, or if `bins` exceeds [`MAX_BINS`].
    pub fn from_data(data: &[f64], bins: usize) -> Result<Self, InvalidDistributionError> {
        if bins > MAX_BINS {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "bins",
                reason: format!("must be at most {MAX_BINS}, got {bins}"),
            });
        }
        let (min, max) = finite_range(data)?;

        if min == max {
            return Self::from_counts(vec![min, max], vec![data.len() as u64]);
        }

        let bins = if bins == 0 { auto_bins(data.len()) } else { bins };
        let width = (max - min) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| min + width * i as f64).collect();
        edges.push(max);

        let mut counts = vec![0_u64; bins];
        for &x in data {
            let idx = (((x - min) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Self::from_counts(edges, counts)
    }

    /// Builds a histogram from explicit bin edges and counts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if the edges are not non-decreasing
    /// and finite, if `counts.len() != edges.len() - 1`, or if every count is
    /// zero.
    pub fn from_counts(edges: Vec<f64>, counts: Vec<u64>) -> Result<Self, InvalidDistributionError> {
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(InvalidDistributionError::NonFinite);
        }
        if edges.len() < 2 || counts.len() != edges.len() - 1 {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "edges",
                reason: format!(
                    "must have exactly one more entry than counts ({} edges, {} counts)",
                    edges.len(),
                    counts.len()
                ),
            });
        }
        if edges.windows(2).any(|w| w[1] < w[0]) {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "edges",
                reason: "must be non-decreasing".into(),
            });
        }
        let chooser = WeightedIndex::new(&counts).map_err(|_| InvalidDistributionError::Empty)?;
        Ok(Self {
            edges,
            counts,
            chooser,
        })
    }

    /// Draws a bin weighted by its count, then a uniform point inside it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let bin = self.chooser.sample(rng);
        let lo = self.edges[bin];
        let hi = self.edges[bin + 1];
        if hi > lo {
            lo + rng.random::<f64>() * (hi - lo)
        } else {
            lo
        }
    }

    /// Bin edges, one more than the number of bins.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Per-bin observation counts.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total number of observations.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Returns `(min, max)` of `data`, rejecting empty or non-finite input.
pub(crate) fn finite_range(data: &[f64]) -> Result<(f64, f64), InvalidDistributionError> {
    if data.is_empty() {
        return Err(InvalidDistributionError::Empty);
    }
    if data.iter().any(|x| !x.is_finite()) {
        return Err(InvalidDistributionError::NonFinite);
    }
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok((min, max))
}

fn auto_bins(n: usize) -> usize {
    ((n as f64).sqrt().ceil() as usize).clamp(1, MAX_AUTO_BINS)
}
