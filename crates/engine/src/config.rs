//! Evolution and evaluator configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Which fitness evaluator the loop uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// Heuristic simulator, no network
    #[default]
    Internal,
    /// Submit to the remote backtest service only
    External,
    /// Internal score plus a best-effort external submission
    Hybrid,
}

impl EvaluatorKind {
    pub fn needs_backtest_api(&self) -> bool {
        matches!(self, EvaluatorKind::External | EvaluatorKind::Hybrid)
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatorKind::Internal => write!(f, "internal"),
            EvaluatorKind::External => write!(f, "external"),
            EvaluatorKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for EvaluatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal" => Ok(EvaluatorKind::Internal),
            "external" => Ok(EvaluatorKind::External),
            "hybrid" => Ok(EvaluatorKind::Hybrid),
            other => Err(ConfigError::Invalid {
                name: "FITNESS_EVALUATOR",
                reason: format!("unknown evaluator '{other}' (expected internal, external or hybrid)"),
            }),
        }
    }
}

/// Remote backtest service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub lookback_days: u32,
    pub initial_capital: f64,
}

impl BacktestApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: 30,
            lookback_days: 30,
            initial_capital: 10_000.0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tunables of the generational loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub seed_per_family: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elite_fraction: f64,
    /// Whether this cycle's elites may also be drawn as breeding parents
    pub elites_breed: bool,
    /// Fitness assigned when evaluation fails or yields no score
    pub default_fitness: f64,
    pub cycle_interval_secs: u64,
    pub retry_interval_secs: u64,
    pub evaluator: EvaluatorKind,
    pub evaluation_concurrency: usize,
    pub backtest_api: Option<BacktestApiConfig>,
    /// RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            seed_per_family: 5,
            tournament_size: 3,
            crossover_rate: 0.7,
            mutation_rate: 0.1,
            elite_fraction: 0.1,
            elites_breed: true,
            default_fitness: 0.5,
            cycle_interval_secs: 60,
            retry_interval_secs: 30,
            evaluator: EvaluatorKind::Internal,
            evaluation_concurrency: 1,
            backtest_api: None,
            seed: None,
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

impl EvolutionConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// ceil(elite_fraction × N), tolerant of float noise (0.1 × 30 is not exactly 3)
    pub fn elite_count(&self) -> usize {
        let raw = self.elite_fraction * self.population_size as f64;
        // Relative slack: absorbs rounding error without flooring tiny fractions to 0
        let count = (raw * (1.0 - 1e-12)).ceil().max(0.0) as usize;
        count.min(self.population_size)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::Invalid {
                name: "POPULATION_SIZE",
                reason: "must be at least 1".into(),
            });
        }
        if self.seed_per_family == 0 {
            return Err(ConfigError::Invalid {
                name: "SEED_PER_FAMILY",
                reason: "must be at least 1".into(),
            });
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::Invalid {
                name: "TOURNAMENT_SIZE",
                reason: "must be at least 1".into(),
            });
        }
        if self.tournament_size > self.population_size {
            return Err(ConfigError::Invalid {
                name: "TOURNAMENT_SIZE",
                reason: format!(
                    "{} exceeds population size {}",
                    self.tournament_size, self.population_size
                ),
            });
        }
        if self.evaluation_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "EVALUATION_CONCURRENCY",
                reason: "must be at least 1".into(),
            });
        }
        check_rate("CROSSOVER_RATE", self.crossover_rate)?;
        check_rate("MUTATION_RATE", self.mutation_rate)?;
        check_rate("ELITE_FRACTION", self.elite_fraction)?;
        if !self.default_fitness.is_finite() {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_FITNESS",
                reason: "must be finite".into(),
            });
        }

        if self.evaluator.needs_backtest_api() {
            let api = self
                .backtest_api
                .as_ref()
                .ok_or(ConfigError::Missing("BACKTESTING_PLATFORM_URL"))?;
            if api.base_url.trim().is_empty() {
                return Err(ConfigError::Missing("BACKTESTING_PLATFORM_URL"));
            }
            if api.api_key.trim().is_empty() {
                return Err(ConfigError::Missing("BACKTESTING_PLATFORM_API_KEY"));
            }
            if api.timeout_secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "BACKTEST_TIMEOUT_SECS",
                    reason: "must be at least 1".into(),
                });
            }
        }

        Ok(())
    }
}
