//! Strategy Factory Engine — genetic evolution of trading strategy specs
//!
//! Provides:
//! - Strategy family registry with default parameter schemas and fitness heuristics
//! - Genomes and genetic operators (tournament selection, crossover, mutation)
//! - Fitness evaluators: internal simulation, external backtest platform, hybrid
//! - Result publisher writing to named streams
//! - The evolution loop with elitism and cooperative shutdown

pub mod api;
pub mod config;
pub mod error;
pub mod evolution;
pub mod families;
pub mod fitness;
pub mod genome;
pub mod operators;
pub mod publisher;
pub mod types;

// Re-exports for convenience
pub use api::BacktestClient;
pub use config::{BacktestApiConfig, EvaluatorKind, EvolutionConfig};
pub use error::{ConfigError, EvaluationError, EvolutionError, PublishError};
pub use evolution::{
    breed_next_generation, CycleReport, EvolutionEngine, EvolutionProgress, EvolutionStatus,
    NextGeneration,
};
pub use families::{FamilyProfile, FamilyRegistry};
pub use fitness::{
    build_evaluator, Evaluation, ExternalEvaluator, FitnessEvaluator, HybridEvaluator,
    InternalSimulator,
};
pub use genome::StrategyGenome;
pub use operators::{crossover, mutate, tournament_select};
pub use publisher::{
    MemoryStream, ResultPublisher, SqliteStreamSink, StreamSink, BACKTEST_JOBS_SUBMITTED,
    BACKTEST_RESULTS, STRATEGY_SPECS,
};
pub use types::*;
