//! Environment configuration for the strategy factory

use engine::{BacktestApiConfig, ConfigError, EvaluatorKind, EvolutionConfig};
use std::str::FromStr;

pub const DEFAULT_STREAM_DB_PATH: &str = "data/streams.db";

/// Path of the SQLite stream store
pub fn stream_db_path() -> String {
    std::env::var("STRATEGY_STREAM_DB_PATH").unwrap_or_else(|_| DEFAULT_STREAM_DB_PATH.to_string())
}

/// Build the evolution config from process environment variables
pub fn from_env() -> Result<EvolutionConfig, ConfigError> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Build the evolution config from any key lookup. Unset or blank values keep defaults.
pub fn from_lookup<F>(lookup: F) -> Result<EvolutionConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let defaults = EvolutionConfig::default();

    let evaluator = match get("FITNESS_EVALUATOR") {
        Some(raw) => raw.parse::<EvaluatorKind>()?,
        None => defaults.evaluator,
    };

    let backtest_api = match get("BACKTESTING_PLATFORM_URL") {
        Some(url) => {
            let mut api = BacktestApiConfig::new(
                url,
                get("BACKTESTING_PLATFORM_API_KEY").unwrap_or_default(),
            );
            if let Some(raw) = get("BACKTEST_TIMEOUT_SECS") {
                api.timeout_secs = parse("BACKTEST_TIMEOUT_SECS", &raw)?;
            }
            Some(api)
        }
        None => None,
    };

    let seed = get("EVOLUTION_SEED")
        .map(|raw| parse("EVOLUTION_SEED", &raw))
        .transpose()?;

    Ok(EvolutionConfig {
        population_size: or_default(&get, "POPULATION_SIZE", defaults.population_size)?,
        seed_per_family: or_default(&get, "SEED_PER_FAMILY", defaults.seed_per_family)?,
        tournament_size: or_default(&get, "TOURNAMENT_SIZE", defaults.tournament_size)?,
        crossover_rate: or_default(&get, "CROSSOVER_RATE", defaults.crossover_rate)?,
        mutation_rate: or_default(&get, "MUTATION_RATE", defaults.mutation_rate)?,
        elite_fraction: or_default(&get, "ELITE_FRACTION", defaults.elite_fraction)?,
        elites_breed: match get("ELITES_BREED") {
            Some(raw) => parse_flag("ELITES_BREED", &raw)?,
            None => defaults.elites_breed,
        },
        default_fitness: or_default(&get, "DEFAULT_FITNESS", defaults.default_fitness)?,
        cycle_interval_secs: or_default(&get, "CYCLE_INTERVAL_SECS", defaults.cycle_interval_secs)?,
        retry_interval_secs: or_default(&get, "RETRY_INTERVAL_SECS", defaults.retry_interval_secs)?,
        evaluator,
        evaluation_concurrency: or_default(
            &get,
            "EVALUATION_CONCURRENCY",
            defaults.evaluation_concurrency,
        )?,
        backtest_api,
        seed,
    })
}

fn or_default<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => parse(name, &raw),
        None => Ok(default),
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: format!("{raw:?}: {e}"),
    })
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("{other:?} is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<EvolutionConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = load(&[]).unwrap();
        let defaults = EvolutionConfig::default();
        assert_eq!(config.population_size, defaults.population_size);
        assert_eq!(config.tournament_size, defaults.tournament_size);
        assert_eq!(config.evaluator, EvaluatorKind::Internal);
        assert!(config.elites_breed);
        assert!(config.backtest_api.is_none());
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = load(&[
            ("POPULATION_SIZE", "30"),
            ("TOURNAMENT_SIZE", "5"),
            ("MUTATION_RATE", "0.25"),
            ("ELITES_BREED", "no"),
            ("FITNESS_EVALUATOR", "hybrid"),
            ("BACKTESTING_PLATFORM_URL", "http://backtest:8000"),
            ("BACKTESTING_PLATFORM_API_KEY", "secret"),
            ("BACKTEST_TIMEOUT_SECS", "12"),
            ("EVOLUTION_SEED", "42"),
        ])
        .unwrap();

        assert_eq!(config.population_size, 30);
        assert_eq!(config.tournament_size, 5);
        assert_eq!(config.mutation_rate, 0.25);
        assert!(!config.elites_breed);
        assert_eq!(config.evaluator, EvaluatorKind::Hybrid);
        assert_eq!(config.seed, Some(42));
        let api = config.backtest_api.as_ref().unwrap();
        assert_eq!(api.base_url, "http://backtest:8000");
        assert_eq!(api.api_key, "secret");
        assert_eq!(api.timeout_secs, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_value_names_the_variable() {
        let err = load(&[("POPULATION_SIZE", "ten")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "POPULATION_SIZE", .. }));

        let err = load(&[("ELITES_BREED", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ELITES_BREED", .. }));
    }

    #[test]
    fn test_external_without_credentials_fails_validation() {
        let config = load(&[("FITNESS_EVALUATOR", "external")]).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("BACKTESTING_PLATFORM_URL"))
        );

        let config = load(&[
            ("FITNESS_EVALUATOR", "external"),
            ("BACKTESTING_PLATFORM_URL", "http://backtest:8000"),
        ])
        .unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("BACKTESTING_PLATFORM_API_KEY"))
        );
    }

    #[test]
    fn test_zero_backtest_timeout_fails_validation() {
        let config = load(&[
            ("FITNESS_EVALUATOR", "external"),
            ("BACKTESTING_PLATFORM_URL", "http://backtest:8000"),
            ("BACKTESTING_PLATFORM_API_KEY", "secret"),
            ("BACKTEST_TIMEOUT_SECS", "0"),
        ])
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "BACKTEST_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = load(&[("POPULATION_SIZE", "  "), ("EVOLUTION_SEED", "")]).unwrap();
        assert_eq!(config.population_size, 10);
        assert!(config.seed.is_none());
    }
}
