//! Error types for the evolution engine

use thiserror::Error;

/// Invalid or missing settings. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Fitness evaluation failed; the caller falls back to the default fitness
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("backtest request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backtest service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backtest response: {0}")]
    MalformedResponse(String),
}

/// A stream write failed; logged, never fatal
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stream store error: {0}")]
    Store(#[from] persistence::DbError),

    #[error("stream {0} rejected the entry")]
    Rejected(String),
}

/// Failure of a whole evolution cycle; the loop backs off and retries
#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("tournament of {requested} requested from a population of {available}")]
    EmptyPopulation { requested: usize, available: usize },

    #[error("tournament size must be at least 1")]
    InvalidTournamentSize,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
