//! Weighted mixture of child distributions.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;

use super::Distribution;
use crate::error::InvalidDistributionError;

#[derive(Debug, Clone)]
pub struct Mixture {
    children: Vec<Arc<Distribution>>,
    weights: Vec<f64>,
    chooser: WeightedIndex<f64>,
}

impl Mixture {
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if there are no children, if the
    /// child and weight counts differ, or if the weights are not finite,
    /// non-negative and of positive sum.
    pub fn new(
        children: Vec<Arc<Distribution>>,
        weights: Vec<f64>,
    ) -> Result<Self, InvalidDistributionError> {
        if children.is_empty() {
            return Err(InvalidDistributionError::Empty);
        }
        if children.len() != weights.len() {
            return Err(InvalidDistributionError::WeightMismatch {
                children: children.len(),
                weights: weights.len(),
            });
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(InvalidDistributionError::NonFinite);
        }
        let chooser = WeightedIndex::new(&weights).map_err(|e| {
            InvalidDistributionError::InvalidParameter {
                name: "weights",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            children,
            weights,
            chooser,
        })
    }

    /// Picks a child proportionally to its weight and delegates to it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.children[self.chooser.sample(rng)].sample(rng)
    }

    pub fn children(&self) -> &[Arc<Distribution>] {
        &self.children
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}
