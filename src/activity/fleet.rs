//! Construction of the set of computers and their activity models, either
//! from a loaded trace or from synthetic log-normal usage.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use super::{ActivityModel, ActivityProfile, ContextSamples, FallbackPolicy, TraceDataset, TrainingGaps};
use crate::dist::{Distribution, DistributionCache, FitPolicy};
use crate::error::InvalidDistributionError;

/// Inactivity samples drawn from a synthetic model for timeout tuning.
const SYNTHETIC_REFERENCE_SAMPLES: usize = 10_000;

/// How trace observations are grouped into models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    pub fit: FitPolicy,
    pub fallback: FallbackPolicy,
    /// One model per computer rather than one shared by the fleet.
    pub per_computer: bool,
    /// One profile per context rather than one for the whole week.
    pub per_hour: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            fit: FitPolicy::default(),
            fallback: FallbackPolicy::default(),
            per_computer: true,
            per_hour: true,
        }
    }
}

/// Log-normal usage parameters for a fleet without trace data.
///
/// Inactivity gaps follow a log-normal body mixed with a power-law tail
/// bounded by `[inactivity_mean_secs, tail_max_secs]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticFleet {
    pub computers: usize,
    pub activity_mean_secs: f64,
    pub activity_std_secs: f64,
    pub inactivity_mean_secs: f64,
    pub inactivity_std_secs: f64,
    pub tail_exponent: f64,
    /// Mixture weight of the tail, in `[0, 1)`.
    pub tail_weight: f64,
    pub tail_max_secs: f64,
}

/// A simulated computer, the model its user samples from and the gaps its
/// timeouts are tuned on.
#[derive(Debug, Clone)]
pub struct FleetMember {
    pub name: String,
    pub model: Arc<ActivityModel>,
    pub training: Arc<TrainingGaps>,
}

/// The computers to simulate plus the reference inactivity sample used to
/// tune fleet-wide timeouts.
#[derive(Debug, Clone)]
pub struct Fleet {
    members: Vec<FleetMember>,
    inactivity_samples: Vec<f64>,
}

impl Fleet {
    /// Builds models from a trace.
    ///
    /// Timeouts are tuned on `training` when given, otherwise on `dataset`
    /// itself. Both should hold the same computers, see
    /// [`TraceDataset::intersect`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` if fitting any model fails.
    pub fn from_trace(
        dataset: &TraceDataset,
        training: Option<&TraceDataset>,
        options: &ModelOptions,
        cache: &mut DistributionCache,
    ) -> Result<Self, InvalidDistributionError> {
        let source = training.unwrap_or(dataset);
        let shared_training = Arc::new(TrainingGaps::from_samples(&source.pooled(), options.per_hour));
        let training_for = |name: &str, own: &ContextSamples| {
            if options.per_computer {
                let samples = source.computer(name).unwrap_or(own);
                Arc::new(TrainingGaps::from_samples(samples, options.per_hour))
            } else {
                Arc::clone(&shared_training)
            }
        };

        let build = |samples: &ContextSamples, cache: &mut DistributionCache| {
            if options.per_hour {
                ActivityModel::build(samples, &options.fit, options.fallback, cache)
            } else {
                ActivityModel::build_collapsed(samples, &options.fit, cache)
            }
        };

        let members = if options.per_computer {
            dataset
                .computers()
                .map(|(name, samples)| {
                    Ok(FleetMember {
                        name: name.to_string(),
                        model: Arc::new(build(samples, cache)?),
                        training: training_for(name, samples),
                    })
                })
                .collect::<Result<Vec<_>, InvalidDistributionError>>()?
        } else {
            let shared = Arc::new(build(&dataset.pooled(), cache)?);
            dataset
                .computers()
                .map(|(name, samples)| FleetMember {
                    name: name.to_string(),
                    model: Arc::clone(&shared),
                    training: training_for(name, samples),
                })
                .collect()
        };

        info!(
            computers = members.len(),
            distinct_distributions = cache.len(),
            "fleet built from trace"
        );
        Ok(Self {
            members,
            inactivity_samples: source.inactivity_samples(),
        })
    }

    /// Builds `params.computers` identical members sharing one synthetic model.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDistributionError` for invalid log-normal or tail
    /// parameters.
    pub fn synthetic(
        params: &SyntheticFleet,
        cache: &mut DistributionCache,
        seed: u64,
    ) -> Result<Self, InvalidDistributionError> {
        let activity = cache.intern(Distribution::from_log_normal(
            params.activity_mean_secs,
            params.activity_std_secs,
        )?);
        let body = cache.intern(Distribution::from_log_normal(
            params.inactivity_mean_secs,
            params.inactivity_std_secs,
        )?);
        let inactivity = if params.tail_weight > 0.0 {
            let tail = cache.intern(Distribution::from_bounded_power_law(
                params.tail_exponent,
                params.inactivity_mean_secs,
                params.tail_max_secs,
            )?);
            cache.intern(Distribution::combine(
                vec![body, tail],
                vec![1.0 - params.tail_weight, params.tail_weight],
            )?)
        } else {
            body
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let inactivity_samples: Vec<f64> = (0..SYNTHETIC_REFERENCE_SAMPLES)
            .map(|_| inactivity.sample(&mut rng))
            .collect();
        let training = Arc::new(TrainingGaps::pooled(inactivity_samples.clone()));

        let model = Arc::new(ActivityModel::uniform(ActivityProfile::new(activity, inactivity)));
        let width = params.computers.to_string().len();
        let members = (0..params.computers)
            .map(|i| FleetMember {
                name: format!("workstation{i:0width$}"),
                model: Arc::clone(&model),
                training: Arc::clone(&training),
            })
            .collect();

        info!(computers = params.computers, "synthetic fleet built");
        Ok(Self {
            members,
            inactivity_samples,
        })
    }

    pub fn members(&self) -> &[FleetMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Observed (or, for synthetic fleets, reference) inactivity gaps.
    pub fn inactivity_samples(&self) -> &[f64] {
        &self.inactivity_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ContextKey, TraceFilter};

    fn synthetic_params() -> SyntheticFleet {
        SyntheticFleet {
            computers: 12,
            activity_mean_secs: 1_800.0,
            activity_std_secs: 1_800.0,
            inactivity_mean_secs: 3_600.0,
            inactivity_std_secs: 1_800.0,
            tail_exponent: 2.5,
            tail_weight: 0.1,
            tail_max_secs: 28_800.0,
        }
    }

    #[test]
    fn synthetic_members_share_a_model() {
        let mut cache = DistributionCache::new();
        let fleet = Fleet::synthetic(&synthetic_params(), &mut cache, 42).unwrap();
        assert_eq!(fleet.len(), 12);
        assert_eq!(fleet.members()[0].name, "workstation00");
        assert_eq!(fleet.members()[11].name, "workstation11");
        assert!(Arc::ptr_eq(&fleet.members()[0].model, &fleet.members()[5].model));
        assert_eq!(fleet.inactivity_samples().len(), SYNTHETIC_REFERENCE_SAMPLES);
    }

    #[test]
    fn synthetic_without_tail_is_plain_log_normal() {
        let mut cache = DistributionCache::new();
        let params = SyntheticFleet {
            tail_weight: 0.0,
            ..synthetic_params()
        };
        let fleet = Fleet::synthetic(&params, &mut cache, 1).unwrap();
        let model = &fleet.members()[0].model;
        assert_eq!(model.aggregate().inactivity.tag(), "log-normal");
    }

    #[test]
    fn synthetic_reference_samples_are_seeded() {
        let mut c1 = DistributionCache::new();
        let mut c2 = DistributionCache::new();
        let a = Fleet::synthetic(&synthetic_params(), &mut c1, 7).unwrap();
        let b = Fleet::synthetic(&synthetic_params(), &mut c2, 7).unwrap();
        assert_eq!(a.inactivity_samples(), b.inactivity_samples());
    }

    const TRACE: &str = r#"[
        {"PC": "a", "Type": "ActivityIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [30.0]}]},
        {"PC": "a", "Type": "InactivityIntervals",
         "data": [{"Day": "Monday", "Hour": "08", "Intervals": [300.0]}]},
        {"PC": "b", "Type": "ActivityIntervals",
         "data": [{"Day": "Monday", "Hour": "09", "Intervals": [60.0]}]},
        {"PC": "b", "Type": "InactivityIntervals",
         "data": [{"Day": "Monday", "Hour": "09", "Intervals": [900.0]}]}
    ]"#;

    fn dataset() -> TraceDataset {
        TraceDataset::from_json_str(
            TRACE,
            &TraceFilter {
                xmin: 60.0,
                xmax: 3_600.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn per_computer_models_are_distinct() {
        let mut cache = DistributionCache::new();
        let fleet = Fleet::from_trace(&dataset(), None, &ModelOptions::default(), &mut cache).unwrap();
        assert_eq!(fleet.len(), 2);
        assert!(!Arc::ptr_eq(&fleet.members()[0].model, &fleet.members()[1].model));
        assert_eq!(fleet.members()[0].model.observed_contexts(), 1);
    }

    #[test]
    fn merged_fleet_shares_pooled_model() {
        let mut cache = DistributionCache::new();
        let options = ModelOptions {
            per_computer: false,
            ..ModelOptions::default()
        };
        let fleet = Fleet::from_trace(&dataset(), None, &options, &mut cache).unwrap();
        assert!(Arc::ptr_eq(&fleet.members()[0].model, &fleet.members()[1].model));
        assert!(Arc::ptr_eq(&fleet.members()[0].training, &fleet.members()[1].training));
        assert_eq!(fleet.members()[0].model.observed_contexts(), 2);
    }

    #[test]
    fn collapsed_hours_cover_every_context() {
        let mut cache = DistributionCache::new();
        let options = ModelOptions {
            per_hour: false,
            ..ModelOptions::default()
        };
        let fleet = Fleet::from_trace(&dataset(), None, &options, &mut cache).unwrap();
        assert_eq!(
            fleet.members()[0].model.observed_contexts(),
            crate::activity::CONTEXTS
        );
        assert!(fleet.members()[0].training.by_context.is_empty());
    }

    #[test]
    fn training_trace_supplies_the_gaps() {
        let training = TraceDataset::from_json_str(
            r#"[
            {"PC": "a", "Type": "ActivityIntervals",
             "data": [{"Day": "Monday", "Hour": "08", "Intervals": [30.0]}]},
            {"PC": "a", "Type": "InactivityIntervals",
             "data": [{"Day": "Monday", "Hour": "08", "Intervals": [120.0, 180.0]}]},
            {"PC": "b", "Type": "ActivityIntervals",
             "data": [{"Day": "Monday", "Hour": "09", "Intervals": [60.0]}]},
            {"PC": "b", "Type": "InactivityIntervals",
             "data": [{"Day": "Monday", "Hour": "09", "Intervals": [2400.0]}]}
        ]"#,
            &TraceFilter {
                xmin: 60.0,
                xmax: 3_600.0,
            },
        )
        .unwrap();
        let mut cache = DistributionCache::new();
        let fleet = Fleet::from_trace(&dataset(), Some(&training), &ModelOptions::default(), &mut cache).unwrap();

        let a = &fleet.members()[0];
        assert_eq!(a.training.all, vec![120.0, 180.0]);
        assert_eq!(a.training.for_context(ContextKey { day: 1, hour: 8 }), &[120.0, 180.0]);
        assert_eq!(fleet.members()[1].training.all, vec![2_400.0]);
        let mut reference = fleet.inactivity_samples().to_vec();
        reference.sort_by(f64::total_cmp);
        assert_eq!(reference, vec![120.0, 180.0, 2_400.0]);
    }

    #[test]
    fn own_trace_trains_when_no_training_trace() {
        let mut cache = DistributionCache::new();
        let fleet = Fleet::from_trace(&dataset(), None, &ModelOptions::default(), &mut cache).unwrap();
        assert_eq!(fleet.members()[0].training.all, vec![300.0]);
        assert_eq!(fleet.members()[1].training.all, vec![900.0]);
    }
}
