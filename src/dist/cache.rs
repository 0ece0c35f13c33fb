//! Deduplication of structurally identical distributions.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::trace;

use super::Distribution;

/// Canonical parameter tuple of a [`Distribution`].
///
/// Floats are compared by bit pattern with `-0.0` folded into `0.0`, so two
/// distributions share a key exactly when their parameters are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistributionKey {
    Empirical { edges: Vec<u64>, counts: Vec<u64> },
    Kde { data: Vec<u64>, bandwidth: u64 },
    PowerLaw { alpha: u64, x_min: u64, x_max: Option<u64> },
    LogNormal { mean: u64, std_dev: u64 },
    Composite { children: Vec<DistributionKey>, weights: Vec<u64> },
}

impl DistributionKey {
    pub fn of(dist: &Distribution) -> Self {
        match dist {
            Distribution::Empirical(h) => Self::Empirical {
                edges: bits_of(h.edges()),
                counts: h.counts().to_vec(),
            },
            Distribution::Kde(k) => Self::Kde {
                data: bits_of(k.data()),
                bandwidth: bits(k.bandwidth()),
            },
            Distribution::PowerLaw(p) => Self::PowerLaw {
                alpha: bits(p.alpha()),
                x_min: bits(p.x_min()),
                x_max: p.x_max().map(bits),
            },
            Distribution::LogNormal(l) => Self::LogNormal {
                mean: bits(l.mean()),
                std_dev: bits(l.std_dev()),
            },
            Distribution::Composite(m) => Self::Composite {
                children: m.children().iter().map(|c| Self::of(c)).collect(),
                weights: bits_of(m.weights()),
            },
        }
    }
}

fn bits(x: f64) -> u64 {
    if x == 0.0 { 0 } else { x.to_bits() }
}

fn bits_of(xs: &[f64]) -> Vec<u64> {
    xs.iter().copied().map(bits).collect()
}

/// Interning table handing out one shared instance per distinct key.
///
/// Populated while the activity model is built; entries are never mutated.
#[derive(Debug, Default)]
pub struct DistributionCache {
    entries: HashMap<DistributionKey, Arc<Distribution>>,
    hits: usize,
}

impl DistributionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance equal to `dist`, inserting it if absent.
    pub fn intern(&mut self, dist: Distribution) -> Arc<Distribution> {
        match self.entries.entry(dist.key()) {
            Entry::Occupied(e) => {
                self.hits += 1;
                trace!(tag = dist.tag(), "distribution cache hit");
                Arc::clone(e.get())
            }
            Entry::Vacant(e) => Arc::clone(e.insert(Arc::new(dist))),
        }
    }

    /// Number of distinct distributions held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `intern` calls answered from the table.
    pub fn hits(&self) -> usize {
        self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_parameters_share_an_instance() {
        let mut cache = DistributionCache::new();
        let a = cache.intern(Distribution::from_empirical(&[1.0, 2.0, 3.0]).unwrap());
        let b = cache.intern(Distribution::from_empirical(&[1.0, 2.0, 3.0]).unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn different_parameters_are_distinct() {
        let mut cache = DistributionCache::new();
        let a = cache.intern(Distribution::from_power_law(2.0, 1.0).unwrap());
        let b = cache.intern(Distribution::from_power_law(2.5, 1.0).unwrap());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn negative_zero_folds_into_zero() {
        assert_eq!(bits(-0.0), bits(0.0));
    }

    #[test]
    fn composite_key_includes_children() {
        let a = Arc::new(Distribution::from_empirical(&[1.0]).unwrap());
        let b = Arc::new(Distribution::from_empirical(&[2.0]).unwrap());
        let m1 = Distribution::combine(vec![Arc::clone(&a)], vec![1.0]).unwrap();
        let m2 = Distribution::combine(vec![b], vec![1.0]).unwrap();
        assert_ne!(m1.key(), m2.key());
    }
}
