//! Workload-aware instance routing.
//!
//! Sticky routing with load spillover: an operation normally runs on the
//! instance preferred for its workload category. With probability
//! `overflow_probability` it is instead redistributed over all configured
//! instances by `routing_weight`, using cumulative-weight sampling against a
//! single uniform draw.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{CorrelateConfig, RoutingConfig, PRIMARY_INSTANCE};
use crate::error::CorrelateError;
use crate::models::InstanceDescriptor;
use crate::workload::WorkloadCategory;

/// Source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_float(&self) -> f64;
}

/// Draws from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_float(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Seeded generator for replayable routing.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_float(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub category: WorkloadCategory,
    pub preferred_instance: String,
    pub resolved_instance: String,
    pub overflowed: bool,
}

/// Maps workload categories onto the immutable instance table.
#[derive(Clone)]
pub struct InstanceRouter {
    instances: Arc<[InstanceDescriptor]>,
    /// Used when a category's preferred name is not configured: primary,
    /// else the first instance.
    fallback: InstanceDescriptor,
    routing: RoutingConfig,
    random: Arc<dyn RandomSource>,
}

impl InstanceRouter {
    pub fn new(config: &CorrelateConfig, random: Arc<dyn RandomSource>) -> Result<Self, CorrelateError> {
        let fallback = config
            .instance(PRIMARY_INSTANCE)
            .or_else(|| config.instances.first())
            .cloned()
            .ok_or_else(|| {
                CorrelateError::InvalidConfig("at least one instance must be configured".into())
            })?;
        Ok(Self {
            instances: config.instances.clone().into(),
            fallback,
            routing: config.routing.clone(),
            random,
        })
    }

    /// Pick the instance for `category`. Never fails.
    pub fn resolve(&self, category: WorkloadCategory) -> (RoutingDecision, &InstanceDescriptor) {
        let preferred = self.preferred(category);

        let overflow_target = if self.random.next_float() < 1.0 - self.routing.overflow_probability {
            None
        } else {
            self.weighted_pick(self.random.next_float())
        };

        let (resolved, overflowed) = match overflow_target {
            Some(target) => (target, true),
            None => (preferred, false),
        };

        let decision = RoutingDecision {
            category,
            preferred_instance: preferred.name.clone(),
            resolved_instance: resolved.name.clone(),
            overflowed,
        };
        (decision, resolved)
    }

    /// Preferred descriptor: mapped name, then the fallback.
    fn preferred(&self, category: WorkloadCategory) -> &InstanceDescriptor {
        let name = self.routing.preferred_instance(category);
        self.find(name).unwrap_or(&self.fallback)
    }

    fn find(&self, name: &str) -> Option<&InstanceDescriptor> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Cumulative-weight sampling. `None` when rounding leaves `draw` past
    /// the last range.
    fn weighted_pick(&self, draw: f64) -> Option<&InstanceDescriptor> {
        let mut cumulative = 0.0;
        for instance in self.instances.iter() {
            cumulative += instance.routing_weight;
            if draw < cumulative {
                return Some(instance);
            }
        }
        None
    }
}
