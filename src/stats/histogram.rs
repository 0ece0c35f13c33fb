//! Fixed-edge histogram with O(1) memory per sample.

use serde::Serialize;

use crate::error::{IncompatibleAggregationError, InvalidDistributionError};

/// Counts of samples falling in each `[edges[i], edges[i + 1])` bin.
///
/// Samples below the first edge land in `underflow`, samples at or above
/// the last edge in `overflow`, so no insertion is ever lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
    underflow: u64,
    overflow: u64,
}

impl Histogram {
    /// Creates an empty histogram over `edges`.
    ///
    /// # Arguments
    ///
    /// * `edges` - Strictly increasing bin edges; the last may be `+inf`
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError::InvalidParameter` if fewer than two
    /// edges are given, if they are not strictly increasing, or if any edge
    /// other than the last is non-finite.
    pub fn new(edges: Vec<f64>) -> Result<Self, InvalidDistributionError> {
        if !valid_edges(&edges) {
            return Err(InvalidDistributionError::InvalidParameter {
                name: "edges",
                reason: "must be at least two, strictly increasing and finite but the last".to_string(),
            });
        }
        let bins = edges.len() - 1;
        Ok(Self {
            edges,
            counts: vec![0; bins],
            underflow: 0,
            overflow: 0,
        })
    }

    /// Adds one sample.
    pub fn insert(&mut self, value: f64) {
        let idx = self.edges.partition_point(|e| *e <= value);
        if idx == 0 {
            self.underflow += 1;
        } else if idx > self.counts.len() {
            self.overflow += 1;
        } else {
            self.counts[idx - 1] += 1;
        }
    }

    /// Bin-wise sum of two histograms with identical edges.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleAggregationError::HistogramEdges` if the edges differ.
    pub fn merge(&self, other: &Self) -> Result<Self, IncompatibleAggregationError> {
        if self.edges != other.edges {
            return Err(IncompatibleAggregationError::HistogramEdges);
        }
        Ok(Self {
            edges: self.edges.clone(),
            counts: self
                .counts
                .iter()
                .zip(&other.counts)
                .map(|(a, b)| a + b)
                .collect(),
            underflow: self.underflow + other.underflow,
            overflow: self.overflow + other.overflow,
        })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Samples inserted, including under- and overflow.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.underflow + self.overflow
    }

    /// `(lower, upper, count)` per bin.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, u64)> + '_ {
        self.edges
            .windows(2)
            .zip(&self.counts)
            .map(|(w, &c)| (w[0], w[1], c))
    }
}

/// Whether `edges` can back a [`Histogram`].
pub fn valid_edges(edges: &[f64]) -> bool {
    edges.len() >= 2
        && edges[..edges.len() - 1].iter().all(|e| e.is_finite())
        && !edges[edges.len() - 1].is_nan()
        && edges.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_places_samples_in_half_open_bins() {
        let mut h = Histogram::new(vec![0.0, 10.0, 20.0]).unwrap();
        for x in [0.0, 9.99, 10.0, 19.0, 20.0, -1.0] {
            h.insert(x);
        }
        assert_eq!(h.counts(), &[2, 2]);
        assert_eq!(h.underflow(), 1);
        assert_eq!(h.overflow(), 1);
        assert_eq!(h.total(), 6);
    }

    #[test]
    fn infinite_last_edge_catches_everything_above() {
        let mut h = Histogram::new(vec![0.0, 60.0, f64::INFINITY]).unwrap();
        h.insert(1e12);
        assert_eq!(h.counts(), &[0, 1]);
        assert_eq!(h.overflow(), 0);
    }

    #[test]
    fn merge_sums_counts() {
        let mut a = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        let mut b = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        a.insert(0.5);
        b.insert(0.5);
        b.insert(1.5);
        b.insert(5.0);
        let m = a.merge(&b).unwrap();
        assert_eq!(m.counts(), &[2, 1]);
        assert_eq!(m.overflow(), 1);
    }

    #[test]
    fn merge_rejects_different_edges() {
        let a = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        let b = Histogram::new(vec![0.0, 1.0, 3.0]).unwrap();
        assert_eq!(a.merge(&b), Err(IncompatibleAggregationError::HistogramEdges));
    }

    #[test]
    fn edge_validation() {
        assert!(valid_edges(&[0.0, 1.0]));
        assert!(valid_edges(&[0.0, 1.0, f64::INFINITY]));
        assert!(!valid_edges(&[0.0]));
        assert!(!valid_edges(&[1.0, 1.0]));
        assert!(!valid_edges(&[f64::NEG_INFINITY, 1.0]));
    }

    #[test]
    fn new_rejects_bad_edges() {
        assert!(matches!(
            Histogram::new(vec![2.0, 1.0]),
            Err(InvalidDistributionError::InvalidParameter { name: "edges", .. })
        ));
        assert!(Histogram::new(vec![0.0]).is_err());
        assert!(Histogram::new(vec![f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn bins_iterates_ranges() {
        let mut h = Histogram::new(vec![0.0, 5.0, 10.0]).unwrap();
        h.insert(7.0);
        let bins: Vec<_> = h.bins().collect();
        assert_eq!(bins, vec![(0.0, 5.0, 0), (5.0, 10.0, 1)]);
    }
}
