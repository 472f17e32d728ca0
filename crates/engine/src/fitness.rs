//! Fitness evaluation
//!
//! One capability, three implementations selected by configuration:
//! - [`InternalSimulator`]: family heuristic plus bounded noise, no network
//! - [`ExternalEvaluator`]: submits the spec to the backtest platform and only
//!   confirms submission, so it never yields a score itself
//! - [`HybridEvaluator`]: internal score, plus a best-effort external submission
//!
//! Implementations report failure through `Result`; the evolution loop owns the
//! fallback to the default fitness.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::api::BacktestClient;
use crate::config::{EvaluatorKind, EvolutionConfig};
use crate::error::{ConfigError, EvaluationError};
use crate::families::FamilyRegistry;
use crate::genome::StrategyGenome;

pub const BASE_FITNESS: f64 = 0.5;
pub const NOISE: f64 = 0.2;
pub const MIN_FITNESS: f64 = 0.1;
pub const MAX_FITNESS: f64 = 3.0;

/// Outcome of one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Score, when the evaluator produced one. `None` means the caller must fall back.
    pub fitness: Option<f64>,
    /// Backtest job id, when the genome was submitted to the platform
    pub job_id: Option<String>,
}

impl Evaluation {
    pub fn scored(fitness: f64) -> Self {
        Self {
            fitness: Some(fitness),
            job_id: None,
        }
    }

    pub fn submitted(job_id: String) -> Self {
        Self {
            fitness: None,
            job_id: Some(job_id),
        }
    }
}

#[async_trait]
pub trait FitnessEvaluator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn evaluate(&self, genome: &StrategyGenome) -> Result<Evaluation, EvaluationError>;
}

// ============================================================================
// Internal heuristic
// ============================================================================

/// Heuristic simulator: base score + family bonus + uniform noise, clamped.
pub struct InternalSimulator {
    registry: Arc<FamilyRegistry>,
    rng: Mutex<StdRng>,
}

impl InternalSimulator {
    pub fn new(registry: Arc<FamilyRegistry>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(registry: Arc<FamilyRegistry>, seed: u64) -> Self {
        Self::new(registry, StdRng::seed_from_u64(seed))
    }

    /// Synchronous scoring; the async trait method delegates here
    pub fn score(&self, genome: &StrategyGenome) -> f64 {
        let bonus = self.registry.bonus(genome.family(), genome.params());
        let noise = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(-NOISE..=NOISE)
        };
        let raw = BASE_FITNESS + bonus + noise;
        if raw.is_finite() {
            raw.clamp(MIN_FITNESS, MAX_FITNESS)
        } else {
            MIN_FITNESS
        }
    }
}

#[async_trait]
impl FitnessEvaluator for InternalSimulator {
    fn name(&self) -> &'static str {
        "internal"
    }

    async fn evaluate(&self, genome: &StrategyGenome) -> Result<Evaluation, EvaluationError> {
        let fitness = self.score(genome);
        debug!(strategy_id = %genome.id(), fitness, "Simulated fitness");
        Ok(Evaluation::scored(fitness))
    }
}

// ============================================================================
// External submission
// ============================================================================

/// Submits genomes to the backtest platform. Success carries a job id and no score.
pub struct ExternalEvaluator {
    client: BacktestClient,
}

impl ExternalEvaluator {
    pub fn new(client: BacktestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FitnessEvaluator for ExternalEvaluator {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn evaluate(&self, genome: &StrategyGenome) -> Result<Evaluation, EvaluationError> {
        let job_id = self.client.submit(&genome.to_spec()).await?;
        Ok(Evaluation::submitted(job_id))
    }
}

// ============================================================================
// Hybrid
// ============================================================================

/// Internal score for ranking, external submission for out-of-band results.
/// A failed submission is logged and does not affect the score.
pub struct HybridEvaluator {
    internal: InternalSimulator,
    external: ExternalEvaluator,
}

impl HybridEvaluator {
    pub fn new(internal: InternalSimulator, external: ExternalEvaluator) -> Self {
        Self { internal, external }
    }
}

#[async_trait]
impl FitnessEvaluator for HybridEvaluator {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn evaluate(&self, genome: &StrategyGenome) -> Result<Evaluation, EvaluationError> {
        let mut evaluation = self.internal.evaluate(genome).await?;
        match self.external.evaluate(genome).await {
            Ok(submitted) => evaluation.job_id = submitted.job_id,
            Err(e) => warn!(strategy_id = %genome.id(), error = %e, "Backtest submission failed"),
        }
        Ok(evaluation)
    }
}

/// Build the evaluator selected by `config.evaluator`
pub fn build_evaluator(
    config: &EvolutionConfig,
    registry: Arc<FamilyRegistry>,
) -> Result<Arc<dyn FitnessEvaluator>, ConfigError> {
    let internal = || {
        let rng = match config.seed {
            // Offset so the simulator's noise stream differs from the breeding stream
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        InternalSimulator::new(registry.clone(), rng)
    };
    let external = || -> Result<ExternalEvaluator, ConfigError> {
        let api = config
            .backtest_api
            .as_ref()
            .ok_or(ConfigError::Missing("BACKTESTING_PLATFORM_URL"))?;
        let client = BacktestClient::new(api).map_err(|e| ConfigError::Invalid {
            name: "BACKTESTING_PLATFORM_URL",
            reason: e.to_string(),
        })?;
        Ok(ExternalEvaluator::new(client))
    };

    Ok(match config.evaluator {
        EvaluatorKind::Internal => Arc::new(internal()),
        EvaluatorKind::External => Arc::new(external()?),
        EvaluatorKind::Hybrid => Arc::new(HybridEvaluator::new(internal(), external()?)),
    })
}
