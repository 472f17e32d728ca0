//! Strategy genome — a single candidate in the population

use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::families::FamilyRegistry;
use crate::types::{ParamValue, Params, StrategyFamily, StrategySpec};

/// Process-wide sequence folded into every id, so two genomes created in the same
/// millisecond with the same random suffix still differ.
static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn generate_id<R: Rng + ?Sized>(family: StrategyFamily, tag: &str, rng: &mut R) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{}_{}{:04}",
        family.as_str(),
        tag,
        Utc::now().timestamp_millis(),
        seq,
        rng.gen_range(0..10_000u32)
    )
}

/// A strategy candidate: family, parameters and last measured fitness.
///
/// `id` and `family` are fixed at creation. The parameter key set is fixed too;
/// only values change, through the mutation operator.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyGenome {
    id: String,
    family: StrategyFamily,
    params: Params,
    fitness: f64,
}

impl StrategyGenome {
    /// New genome with the family's canonical default parameters
    pub fn create<R: Rng + ?Sized>(
        family: StrategyFamily,
        registry: &FamilyRegistry,
        rng: &mut R,
    ) -> Self {
        Self::from_parts(family, registry.default_params(family), "gen0", rng)
    }

    pub(crate) fn from_parts<R: Rng + ?Sized>(
        family: StrategyFamily,
        params: Params,
        tag: &str,
        rng: &mut R,
    ) -> Self {
        Self {
            id: generate_id(family, tag, rng),
            family,
            params,
            fitness: 0.0,
        }
    }

    /// Same family and parameters under a fresh id, not yet evaluated
    pub fn respawn<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self::from_parts(self.family, self.params.clone(), "child", rng)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> StrategyFamily {
        self.family
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub(crate) fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    /// Mutable access to existing values only; keys can never be added or removed
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut ParamValue> {
        self.params.values_mut()
    }

    /// Whether the key set equals the family's registered schema
    pub fn has_canonical_keys(&self, registry: &FamilyRegistry) -> bool {
        self.params.keys().eq(registry.default_params(self.family).keys())
    }

    pub fn to_spec(&self) -> StrategySpec {
        StrategySpec {
            id: self.id.clone(),
            family: self.family,
            params: self.params.clone(),
            fitness: self.fitness,
        }
    }
}
