//! Genetic operators: tournament selection, crossover, mutation
//!
//! All operators are free functions over borrowed genomes and take the random
//! source as an argument, so a seeded `StdRng` reproduces a run exactly.

use rand::seq::index;
use rand::Rng;

use crate::error::EvolutionError;
use crate::genome::StrategyGenome;
use crate::types::ParamValue;

const INT_STEP: i64 = 5;
const INT_FLOOR: i64 = 1;
const REAL_STEP: f64 = 0.1;
const REAL_FLOOR: f64 = 0.01;

/// Clamp a rate into a usable probability; NaN counts as zero
pub(crate) fn probability(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Best of `k` distinct genomes drawn uniformly without replacement.
///
/// Ties go to whichever tied genome was drawn first, not to the lowest id.
pub fn tournament_select<'a, R: Rng + ?Sized>(
    population: &'a [StrategyGenome],
    k: usize,
    rng: &mut R,
) -> Result<&'a StrategyGenome, EvolutionError> {
    if k == 0 {
        return Err(EvolutionError::InvalidTournamentSize);
    }
    if k > population.len() {
        return Err(EvolutionError::EmptyPopulation {
            requested: k,
            available: population.len(),
        });
    }

    let mut best: Option<&StrategyGenome> = None;
    for i in index::sample(rng, population.len(), k) {
        let candidate = &population[i];
        match best {
            Some(b) if candidate.fitness() <= b.fitness() => {}
            _ => best = Some(candidate),
        }
    }

    best.ok_or(EvolutionError::EmptyPopulation {
        requested: k,
        available: population.len(),
    })
}

/// Uniform crossover within a family.
///
/// Parents from different families are not crossed: the first parent comes back
/// unchanged, id included.
pub fn crossover<R: Rng + ?Sized>(
    parent1: &StrategyGenome,
    parent2: &StrategyGenome,
    rng: &mut R,
) -> StrategyGenome {
    if parent1.family() != parent2.family() {
        return parent1.clone();
    }

    let params = parent1
        .params()
        .iter()
        .map(|(key, &own)| {
            let value = match parent2.params().get(key) {
                Some(&other) if rng.gen_bool(0.5) => other,
                _ => own,
            };
            (key.clone(), value)
        })
        .collect();

    StrategyGenome::from_parts(parent1.family(), params, "cross", rng)
}

/// Perturb each parameter in place with probability `rate`.
///
/// Integers move by up to ±5 and never drop below 1; reals move by up to ±0.1
/// and never drop below 0.01.
pub fn mutate<R: Rng + ?Sized>(genome: &mut StrategyGenome, rate: f64, rng: &mut R) {
    let rate = probability(rate);
    if rate == 0.0 {
        return;
    }

    for value in genome.values_mut() {
        if !rng.gen_bool(rate) {
            continue;
        }
        *value = match *value {
            ParamValue::Int(v) => {
                ParamValue::Int((v + rng.gen_range(-INT_STEP..=INT_STEP)).max(INT_FLOOR))
            }
            ParamValue::Real(v) => {
                ParamValue::Real((v + rng.gen_range(-REAL_STEP..=REAL_STEP)).max(REAL_FLOOR))
            }
        };
    }
}
