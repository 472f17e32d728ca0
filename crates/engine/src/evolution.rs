//! Evolution loop — seeds a population, then evaluates, breeds, replaces and
//! publishes it once per cycle until cancelled.
//!
//! The engine owns the population outright; operators only ever see borrows of it.
//! Observers (CLI, status reporters) read the shared [`EvolutionProgress`].

use futures_util::{stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::EvolutionConfig;
use crate::error::{ConfigError, EvolutionError};
use crate::families::FamilyRegistry;
use crate::fitness::FitnessEvaluator;
use crate::genome::StrategyGenome;
use crate::operators::{crossover, mutate, probability, tournament_select};
use crate::publisher::ResultPublisher;

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStatus {
    Idle,
    Seeding,
    Evaluating,
    Breeding,
    Publishing,
    Sleeping,
    BackingOff,
    Stopped,
}

/// Shared state between the loop and whoever supervises it
pub struct EvolutionProgress {
    pub status: RwLock<EvolutionStatus>,
    pub generation: AtomicU64,
    pub population_size: AtomicUsize,
    pub best_fitness: RwLock<Option<f64>>,
    pub last_error: RwLock<Option<String>>,
    pub cancelled: AtomicBool,
    wake: Notify,
}

impl EvolutionProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(EvolutionStatus::Idle),
            generation: AtomicU64::new(0),
            population_size: AtomicUsize::new(0),
            best_fitness: RwLock::new(None),
            last_error: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Request shutdown: interrupts the inter-cycle pause and stops the loop
    /// before its next cycle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EvolutionStatus {
        *self.status.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn set_status(&self, status: EvolutionStatus) {
        *self.status.write().unwrap_or_else(|p| p.into_inner()) = status;
    }

    fn set_last_error(&self, message: Option<String>) {
        *self.last_error.write().unwrap_or_else(|p| p.into_inner()) = message;
    }

    /// Sleep for `duration`; returns false when woken by cancellation
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
        !self.is_cancelled()
    }
}

impl Default for EvolutionProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Breeding
// ============================================================================

/// Result of the select-and-breed step
#[derive(Debug, Clone)]
pub struct NextGeneration {
    pub population: Vec<StrategyGenome>,
    /// Ids carried over unchanged, best first
    pub elite_ids: Vec<String>,
}

/// Build the next population of exactly `config.population_size` genomes.
///
/// The top `elite_count` genomes by fitness (stable on ties) are copied unchanged.
/// Every other slot is an offspring with an id not present in `population`.
pub fn breed_next_generation<R: Rng + ?Sized>(
    population: &[StrategyGenome],
    config: &EvolutionConfig,
    rng: &mut R,
) -> Result<NextGeneration, EvolutionError> {
    let target = config.population_size;
    if population.is_empty() {
        return Err(EvolutionError::EmptyPopulation {
            requested: config.tournament_size,
            available: 0,
        });
    }

    let elite_count = config.elite_count().min(population.len());
    let mut ranked: Vec<usize> = (0..population.len()).collect();
    ranked.sort_by(|&a, &b| population[b].fitness().total_cmp(&population[a].fitness()));

    let mut is_elite = vec![false; population.len()];
    let mut next = Vec::with_capacity(target);
    for &i in &ranked[..elite_count] {
        is_elite[i] = true;
        next.push(population[i].clone());
    }
    let elite_ids: Vec<String> = next.iter().map(|g| g.id().to_string()).collect();

    let non_elite: Vec<StrategyGenome>;
    let parents: &[StrategyGenome] = if config.elites_breed {
        population
    } else {
        non_elite = population
            .iter()
            .zip(&is_elite)
            .filter(|&(_, &elite)| !elite)
            .map(|(g, _)| g.clone())
            .collect();
        if non_elite.len() >= config.tournament_size {
            &non_elite
        } else {
            debug!(
                pool = non_elite.len(),
                tournament_size = config.tournament_size,
                "Non-elite pool too small, breeding from whole population"
            );
            population
        }
    };

    let crossover_rate = probability(config.crossover_rate);
    while next.len() < target {
        let parent1 = tournament_select(parents, config.tournament_size, rng)?;
        let parent2 = tournament_select(parents, config.tournament_size, rng)?;

        let mut child = if rng.gen_bool(crossover_rate) {
            crossover(parent1, parent2, rng)
        } else {
            parent1.clone()
        };
        // A parent carried into the next generation becomes a new individual
        if child.id() == parent1.id() {
            child = child.respawn(rng);
        }
        mutate(&mut child, config.mutation_rate, rng);
        next.push(child);
    }

    Ok(NextGeneration {
        population: next,
        elite_ids,
    })
}

// ============================================================================
// Engine
// ============================================================================

/// Summary of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub generation: u64,
    pub evaluated: usize,
    /// Evaluations that returned an error
    pub evaluation_failures: usize,
    /// Genomes that received the default fitness (errors or no score)
    pub defaulted: usize,
    pub jobs_submitted: usize,
    pub elite_ids: Vec<String>,
    pub population_size: usize,
    pub specs_published: usize,
    pub best_fitness: Option<f64>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct EvaluationSummary {
    evaluated: usize,
    failures: usize,
    defaulted: usize,
    jobs_submitted: usize,
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    registry: Arc<FamilyRegistry>,
    evaluator: Arc<dyn FitnessEvaluator>,
    publisher: ResultPublisher,
    progress: Arc<EvolutionProgress>,
    population: Vec<StrategyGenome>,
    generation: u64,
    rng: StdRng,
}

impl EvolutionEngine {
    pub fn new(
        config: EvolutionConfig,
        registry: Arc<FamilyRegistry>,
        evaluator: Arc<dyn FitnessEvaluator>,
        publisher: ResultPublisher,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let seeded = registry.len() * config.seed_per_family;
        if seeded < config.tournament_size {
            return Err(ConfigError::Invalid {
                name: "SEED_PER_FAMILY",
                reason: format!(
                    "{} families × {} seeds cannot fill a tournament of {}",
                    registry.len(),
                    config.seed_per_family,
                    config.tournament_size
                ),
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            registry,
            evaluator,
            publisher,
            progress: Arc::new(EvolutionProgress::new()),
            population: Vec::new(),
            generation: 0,
            rng,
        })
    }

    /// Share an externally owned progress tracker (for shutdown wiring)
    pub fn with_progress(mut self, progress: Arc<EvolutionProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> Arc<EvolutionProgress> {
        self.progress.clone()
    }

    pub fn population(&self) -> &[StrategyGenome] {
        &self.population
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Create `seed_per_family` default genomes for every registered family,
    /// publishing each as it is created. Returns the number published.
    pub async fn seed(&mut self) -> usize {
        self.progress.set_status(EvolutionStatus::Seeding);
        self.population.clear();

        let mut published = 0;
        let families: Vec<_> = self.registry.families().collect();
        for family in families {
            for _ in 0..self.config.seed_per_family {
                let genome = StrategyGenome::create(family, &self.registry, &mut self.rng);
                if self.publisher.publish_spec(&genome).await {
                    published += 1;
                }
                debug!(strategy_id = %genome.id(), "Proposed initial strategy");
                self.population.push(genome);
            }
        }

        self.progress
            .population_size
            .store(self.population.len(), Ordering::Relaxed);
        info!(
            population = self.population.len(),
            families = self.registry.len(),
            "Seed population created"
        );
        published
    }

    /// Evaluate every genome; never fails, falls back to the default fitness
    async fn evaluate_population(&mut self) -> EvaluationSummary {
        // Boxed futures are built up front so the loop future stays Send
        let pending: Vec<_> = self
            .population
            .iter()
            .map(|genome| self.evaluator.evaluate(genome))
            .collect();
        let outcomes: Vec<_> = stream::iter(pending)
            .buffered(self.config.evaluation_concurrency.max(1))
            .collect()
            .await;

        let mut summary = EvaluationSummary::default();
        for (genome, outcome) in self.population.iter_mut().zip(outcomes) {
            summary.evaluated += 1;
            let score = match outcome {
                Ok(evaluation) => {
                    if let Some(job_id) = &evaluation.job_id {
                        summary.jobs_submitted += 1;
                        self.publisher.publish_job_submitted(genome, job_id).await;
                    }
                    evaluation.fitness.filter(|f| f.is_finite())
                }
                Err(e) => {
                    summary.failures += 1;
                    warn!(
                        strategy_id = %genome.id(),
                        evaluator = self.evaluator.name(),
                        error = %e,
                        "Evaluation failed, using default fitness"
                    );
                    None
                }
            };

            match score {
                Some(fitness) => {
                    genome.set_fitness(fitness);
                    self.publisher.publish_backtest_result(genome).await;
                }
                None => {
                    summary.defaulted += 1;
                    genome.set_fitness(self.config.default_fitness);
                }
            }
            debug!(strategy_id = %genome.id(), fitness = genome.fitness(), "Strategy evaluated");
        }

        summary
    }

    /// One full cycle: evaluate, select and breed, replace, publish
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EvolutionError> {
        let started = Instant::now();
        info!(
            generation = self.generation,
            population = self.population.len(),
            "Starting population evolution"
        );

        self.progress.set_status(EvolutionStatus::Evaluating);
        let summary = self.evaluate_population().await;
        let best_fitness = self
            .population
            .iter()
            .map(StrategyGenome::fitness)
            .max_by(f64::total_cmp);

        self.progress.set_status(EvolutionStatus::Breeding);
        let next = breed_next_generation(&self.population, &self.config, &mut self.rng)?;

        self.population = next.population;
        self.generation += 1;
        self.progress
            .generation
            .store(self.generation, Ordering::Relaxed);
        self.progress
            .population_size
            .store(self.population.len(), Ordering::Relaxed);
        *self
            .progress
            .best_fitness
            .write()
            .unwrap_or_else(|p| p.into_inner()) = best_fitness;

        self.progress.set_status(EvolutionStatus::Publishing);
        let mut specs_published = 0;
        for genome in &self.population {
            if self.publisher.publish_spec(genome).await {
                specs_published += 1;
            }
        }

        let report = CycleReport {
            generation: self.generation,
            evaluated: summary.evaluated,
            evaluation_failures: summary.failures,
            defaulted: summary.defaulted,
            jobs_submitted: summary.jobs_submitted,
            elite_ids: next.elite_ids,
            population_size: self.population.len(),
            specs_published,
            best_fitness,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            generation = report.generation,
            population = report.population_size,
            failures = report.evaluation_failures,
            published = report.specs_published,
            best_fitness = ?report.best_fitness,
            elapsed_ms = report.elapsed_ms,
            "Population evolved"
        );
        Ok(report)
    }

    /// Seed (once) and evolve until the progress tracker is cancelled.
    ///
    /// A failed cycle is logged and retried after the shorter retry interval.
    pub async fn run(&mut self) {
        info!(
            evaluator = self.evaluator.name(),
            population_size = self.config.population_size,
            cycle_interval_secs = self.config.cycle_interval_secs,
            "Strategy evolution starting"
        );

        if self.population.is_empty() {
            self.seed().await;
        }

        while !self.progress.is_cancelled() {
            let pause = match self.run_cycle().await {
                Ok(_) => {
                    self.progress.set_last_error(None);
                    self.progress.set_status(EvolutionStatus::Sleeping);
                    self.config.cycle_interval()
                }
                Err(e) => {
                    error!(generation = self.generation, error = %e, "Evolution cycle failed");
                    self.progress.set_last_error(Some(e.to_string()));
                    self.progress.set_status(EvolutionStatus::BackingOff);
                    self.config.retry_interval()
                }
            };

            if !self.progress.pause(pause).await {
                break;
            }
        }

        self.progress.set_status(EvolutionStatus::Stopped);
        info!(generation = self.generation, "Strategy evolution stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::backtest::mock;
    use crate::api::BacktestClient;
    use crate::config::{BacktestApiConfig, EvaluatorKind};
    use crate::fitness::{ExternalEvaluator, InternalSimulator};
    use crate::publisher::testing::RejectingSink;
    use crate::publisher::{MemoryStream, BACKTEST_RESULTS, STRATEGY_SPECS};
    use crate::types::StrategyFamily;
    use serde_json::json;
    use std::collections::HashSet;

    fn test_config(seed: u64) -> EvolutionConfig {
        EvolutionConfig {
            seed: Some(seed),
            cycle_interval_secs: 0,
            retry_interval_secs: 0,
            ..Default::default()
        }
    }

    fn internal_engine(config: EvolutionConfig) -> (EvolutionEngine, Arc<MemoryStream>) {
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(InternalSimulator::seeded(registry.clone(), 1));
        let stream = Arc::new(MemoryStream::new());
        let engine = EvolutionEngine::new(
            config,
            registry,
            evaluator,
            ResultPublisher::new(stream.clone()),
        )
        .unwrap();
        (engine, stream)
    }

    fn scored_population(fitness: &[f64], rng: &mut StdRng) -> Vec<StrategyGenome> {
        let registry = FamilyRegistry::builtin();
        fitness
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let family = StrategyFamily::all()[i % StrategyFamily::all().len()];
                let mut g = StrategyGenome::create(family, &registry, rng);
                g.set_fitness(f);
                g
            })
            .collect()
    }

    #[tokio::test]
    async fn test_seed_then_one_cycle_scenario() {
        let (mut engine, stream) = internal_engine(test_config(42));

        assert_eq!(engine.seed().await, 50);
        assert_eq!(engine.population().len(), 50);
        assert_eq!(stream.len(STRATEGY_SPECS), 50);
        stream.clear();

        let before: HashSet<String> = engine.population().iter().map(|g| g.id().to_string()).collect();
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(engine.population().len(), 10);
        assert_eq!(engine.generation(), 1);
        assert_eq!(report.elite_ids.len(), 1);
        assert_eq!(report.evaluated, 50);
        assert_eq!(report.specs_published, 10);
        assert_eq!(stream.len(STRATEGY_SPECS), 10);
        assert_eq!(stream.len(BACKTEST_RESULTS), 50);

        let carried = engine
            .population()
            .iter()
            .filter(|g| before.contains(g.id()))
            .count();
        assert_eq!(carried, 1);
        assert_eq!(engine.population()[0].id(), report.elite_ids[0]);
        assert_eq!(engine.population()[0].fitness(), report.best_fitness.unwrap());

        let ids: HashSet<&str> = engine.population().iter().map(|g| g.id()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn test_external_non_200_falls_back_to_default_fitness() {
        let (url, _) = mock::serve(500, json!({"error": "unavailable"})).await;
        let api = BacktestApiConfig::new(url, "key");
        let config = EvolutionConfig {
            evaluator: EvaluatorKind::External,
            backtest_api: Some(api.clone()),
            seed_per_family: 1,
            ..test_config(7)
        };
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(ExternalEvaluator::new(BacktestClient::new(&api).unwrap()));
        let stream = Arc::new(MemoryStream::new());
        let mut engine = EvolutionEngine::new(
            config,
            registry,
            evaluator,
            ResultPublisher::new(stream.clone()),
        )
        .unwrap();

        engine.seed().await;
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.evaluation_failures, 10);
        assert_eq!(report.defaulted, 10);
        assert_eq!(report.jobs_submitted, 0);
        assert_eq!(report.best_fitness, Some(0.5));
        assert_eq!(engine.population()[0].fitness(), 0.5);
        assert_eq!(engine.population().len(), 10);
        assert_eq!(stream.len(BACKTEST_RESULTS), 0);
    }

    #[tokio::test]
    async fn test_external_timeout_falls_back_to_default_fitness() {
        let (url, _) =
            mock::serve_delayed(200, json!({"job_id": "late"}), Duration::from_secs(3)).await;
        let mut api = BacktestApiConfig::new(url, "key");
        api.timeout_secs = 1;
        let config = EvolutionConfig {
            evaluator: EvaluatorKind::External,
            backtest_api: Some(api.clone()),
            seed_per_family: 1,
            evaluation_concurrency: 10,
            ..test_config(11)
        };
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(ExternalEvaluator::new(BacktestClient::new(&api).unwrap()));
        let stream = Arc::new(MemoryStream::new());
        let mut engine = EvolutionEngine::new(
            config,
            registry,
            evaluator,
            ResultPublisher::new(stream.clone()),
        )
        .unwrap();

        engine.seed().await;
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.evaluation_failures, 10);
        assert_eq!(report.jobs_submitted, 0);
        assert_eq!(report.best_fitness, Some(0.5));
        assert_eq!(engine.population().len(), 10);
        assert_eq!(stream.len(crate::publisher::BACKTEST_JOBS_SUBMITTED), 0);
    }

    #[tokio::test]
    async fn test_external_success_publishes_jobs_and_defaults_fitness() {
        let (url, _) = mock::serve(200, json!({"job_id": "job"})).await;
        let api = BacktestApiConfig::new(url, "key");
        let config = EvolutionConfig {
            evaluator: EvaluatorKind::External,
            backtest_api: Some(api.clone()),
            seed_per_family: 1,
            evaluation_concurrency: 4,
            ..test_config(7)
        };
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(ExternalEvaluator::new(BacktestClient::new(&api).unwrap()));
        let stream = Arc::new(MemoryStream::new());
        let mut engine = EvolutionEngine::new(
            config,
            registry,
            evaluator,
            ResultPublisher::new(stream.clone()),
        )
        .unwrap();

        engine.seed().await;
        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.jobs_submitted, 10);
        assert_eq!(report.evaluation_failures, 0);
        assert_eq!(report.defaulted, 10);
        assert_eq!(stream.len(crate::publisher::BACKTEST_JOBS_SUBMITTED), 10);
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_fail_the_cycle() {
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(InternalSimulator::seeded(registry.clone(), 1));
        let mut engine = EvolutionEngine::new(
            test_config(3),
            registry,
            evaluator,
            ResultPublisher::new(Arc::new(RejectingSink)),
        )
        .unwrap();

        assert_eq!(engine.seed().await, 0);
        assert_eq!(engine.population().len(), 50);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.specs_published, 0);
        assert_eq!(engine.population().len(), 10);
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let (mut a, _) = internal_engine(test_config(99));
        let (mut b, _) = internal_engine(test_config(99));
        a.seed().await;
        b.seed().await;
        for _ in 0..3 {
            a.run_cycle().await.unwrap();
            b.run_cycle().await.unwrap();
        }

        let snapshot = |e: &EvolutionEngine| -> Vec<_> {
            e.population()
                .iter()
                .map(|g| (g.family(), g.params().clone(), g.fitness()))
                .collect()
        };
        assert_eq!(snapshot(&a), snapshot(&b));
    }

    #[test]
    fn test_population_size_holds_for_all_sizes() {
        let mut rng = StdRng::seed_from_u64(17);
        for n in 1..=12usize {
            for k in 1..=n {
                let config = EvolutionConfig {
                    population_size: n,
                    tournament_size: k,
                    ..Default::default()
                };
                for current in [n, 50] {
                    let fitness: Vec<f64> = (0..current).map(|_| rng.gen_range(0.1..3.0)).collect();
                    let population = scored_population(&fitness, &mut rng);
                    let next = breed_next_generation(&population, &config, &mut rng).unwrap();
                    assert_eq!(next.population.len(), n, "N = {n}, k = {k}");

                    let ids: HashSet<&str> = next.population.iter().map(|g| g.id()).collect();
                    assert_eq!(ids.len(), n);
                }
            }
        }
    }

    #[test]
    fn test_top_genomes_survive_unchanged() {
        let mut rng = StdRng::seed_from_u64(23);
        for n in [1usize, 5, 10, 11, 25] {
            let config = EvolutionConfig {
                population_size: n,
                tournament_size: 1,
                ..Default::default()
            };
            let fitness: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..3.0)).collect();
            let population = scored_population(&fitness, &mut rng);

            let mut ranked = population.clone();
            ranked.sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));
            let expected = &ranked[..config.elite_count()];

            let next = breed_next_generation(&population, &config, &mut rng).unwrap();
            for elite in expected {
                let survivor = next
                    .population
                    .iter()
                    .find(|g| g.id() == elite.id())
                    .expect("elite missing from next generation");
                assert_eq!(survivor, elite);
            }
        }
    }

    #[test]
    fn test_elite_ties_broken_by_current_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let population = scored_population(&[1.0, 2.0, 2.0, 0.5], &mut rng);
        let config = EvolutionConfig {
            population_size: 4,
            elite_fraction: 0.25,
            tournament_size: 2,
            ..Default::default()
        };
        let next = breed_next_generation(&population, &config, &mut rng).unwrap();
        assert_eq!(next.elite_ids, vec![population[1].id().to_string()]);
    }

    /// One high-scoring momentum genome among nine low-scoring social genomes
    fn lone_elite_population(rng: &mut StdRng) -> Vec<StrategyGenome> {
        let registry = FamilyRegistry::builtin();
        let mut population = Vec::new();
        let mut elite = StrategyGenome::create(StrategyFamily::Momentum, &registry, rng);
        elite.set_fitness(2.5);
        population.push(elite);
        for i in 0..9 {
            let mut g = StrategyGenome::create(StrategyFamily::SocialSignal, &registry, rng);
            g.set_fitness(0.2 + i as f64 * 0.1);
            population.push(g);
        }
        population
    }

    #[test]
    fn test_elites_breed_when_enabled() {
        let mut rng = StdRng::seed_from_u64(31);
        let population = lone_elite_population(&mut rng);
        // Tournament over the whole population: the elite always wins
        let config = EvolutionConfig {
            tournament_size: 10,
            elites_breed: true,
            ..Default::default()
        };
        let next = breed_next_generation(&population, &config, &mut rng).unwrap();
        assert!(next
            .population
            .iter()
            .all(|g| g.family() == StrategyFamily::Momentum));
    }

    #[test]
    fn test_elites_excluded_from_breeding_when_disabled() {
        let mut rng = StdRng::seed_from_u64(31);
        let population = lone_elite_population(&mut rng);
        let config = EvolutionConfig {
            tournament_size: 3,
            elites_breed: false,
            ..Default::default()
        };
        let next = breed_next_generation(&population, &config, &mut rng).unwrap();
        assert_eq!(next.population[0].id(), population[0].id());
        assert!(next.population[1..]
            .iter()
            .all(|g| g.family() == StrategyFamily::SocialSignal));
    }

    #[test]
    fn test_bred_genomes_keep_canonical_keys() {
        let registry = FamilyRegistry::builtin();
        let mut rng = StdRng::seed_from_u64(5);
        let mut population = scored_population(&[1.0; 30], &mut rng);
        let config = EvolutionConfig {
            population_size: 30,
            mutation_rate: 0.5,
            ..Default::default()
        };
        for _ in 0..20 {
            population = breed_next_generation(&population, &config, &mut rng)
                .unwrap()
                .population;
            assert!(population.iter().all(|g| g.has_canonical_keys(&registry)));
        }
    }

    #[test]
    fn test_empty_population_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            breed_next_generation(&[], &EvolutionConfig::default(), &mut rng),
            Err(EvolutionError::EmptyPopulation { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let (mut engine, stream) = internal_engine(test_config(5));
        let progress = engine.progress();

        let handle = tokio::spawn(async move {
            engine.run().await;
            engine
        });

        let watcher = async {
            while progress.generation() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            progress.cancel();
        };
        tokio::time::timeout(Duration::from_secs(10), watcher)
            .await
            .unwrap();

        let engine = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(engine.generation() >= 3);
        assert_eq!(engine.population().len(), 10);
        assert_eq!(progress.status(), EvolutionStatus::Stopped);
        assert!(stream.len(STRATEGY_SPECS) >= 50 + 30);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_long_sleep() {
        let config = EvolutionConfig {
            cycle_interval_secs: 3600,
            ..test_config(5)
        };
        let (mut engine, _) = internal_engine(config);
        let progress = engine.progress();

        let handle = tokio::spawn(async move {
            engine.run().await;
            engine
        });

        while progress.generation() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        progress.cancel();

        let engine = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.generation(), 1);
    }

    #[tokio::test]
    async fn test_failed_cycles_are_retried_not_fatal() {
        let config = EvolutionConfig {
            population_size: 3,
            seed_per_family: 1,
            ..test_config(8)
        };
        let (mut engine, _) = internal_engine(config);
        // Tournament larger than the seeded population: every cycle fails in breeding
        engine.config.tournament_size = 20;
        let progress = engine.progress();

        let handle = tokio::spawn(async move {
            engine.run().await;
            engine
        });

        let watcher = async {
            while progress.last_error().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            progress.cancel();
        };
        tokio::time::timeout(Duration::from_secs(10), watcher)
            .await
            .unwrap();

        let engine = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.generation(), 0);
        assert!(progress.last_error().unwrap().contains("tournament"));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(InternalSimulator::seeded(registry.clone(), 1));
        let result = EvolutionEngine::new(
            EvolutionConfig {
                evaluator: EvaluatorKind::External,
                ..Default::default()
            },
            registry,
            evaluator,
            ResultPublisher::new(Arc::new(MemoryStream::new())),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_seed_population_smaller_than_tournament_is_rejected() {
        let mut registry = FamilyRegistry::empty();
        if let Some(profile) = FamilyRegistry::builtin().get(StrategyFamily::Momentum) {
            registry.register(*profile);
        }
        let registry = Arc::new(registry);
        let evaluator = Arc::new(InternalSimulator::seeded(registry.clone(), 1));
        let result = EvolutionEngine::new(
            EvolutionConfig {
                population_size: 3,
                seed_per_family: 2,
                tournament_size: 3,
                ..Default::default()
            },
            registry,
            evaluator,
            ResultPublisher::new(Arc::new(MemoryStream::new())),
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "SEED_PER_FAMILY", .. })
        ));
    }

    #[test]
    fn test_zero_seed_per_family_is_rejected_at_construction() {
        let registry = Arc::new(FamilyRegistry::builtin());
        let evaluator = Arc::new(InternalSimulator::seeded(registry.clone(), 1));
        let result = EvolutionEngine::new(
            EvolutionConfig {
                seed_per_family: 0,
                ..Default::default()
            },
            registry,
            evaluator,
            ResultPublisher::new(Arc::new(MemoryStream::new())),
        );
        assert!(result.is_err());
    }
}
