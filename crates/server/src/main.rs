//! Strategy Factory — evolves trading strategy specs and publishes them to streams
//!
//! Usage:
//!   strategy-factory run                     — Seed and evolve until Ctrl+C
//!   strategy-factory once --seed 42          — Seed and run a single cycle
//!   strategy-factory tail --stream strategy_specs
//!   strategy-factory families

mod config;

use clap::{Args, Parser, Subcommand};
use engine::{
    build_evaluator, EvaluatorKind, EvolutionConfig, EvolutionEngine, FamilyRegistry,
    MemoryStream, ResultPublisher, SqliteStreamSink, StreamSink,
};
use persistence::repository::StreamRepository;
use std::sync::Arc;
use tracing::{error, info};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));
const PRODUCER: &str = "strategy_factory";

#[derive(Parser)]
#[command(name = "strategy-factory")]
#[command(about = "Genetic strategy factory publishing specs to streams", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a population and evolve it until Ctrl+C
    Run(RunArgs),
    /// Seed a population, run one cycle and print the report
    Once(RunArgs),
    /// Print the latest entries of a stream
    Tail {
        /// Stream name (strategy_specs, backtest_jobs_submitted, backtest_results)
        #[arg(long, default_value = engine::STRATEGY_SPECS)]
        stream: String,
        /// Number of entries to print
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// List registered strategy families and their default parameters
    Families,
}

/// Command-line overrides applied on top of the environment
#[derive(Args)]
struct RunArgs {
    /// Publish to an in-memory stream instead of the SQLite store
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    population_size: Option<usize>,
    #[arg(long)]
    tournament_size: Option<usize>,
    #[arg(long)]
    evaluator: Option<EvaluatorKind>,
    #[arg(long)]
    evaluation_concurrency: Option<usize>,
    #[arg(long)]
    cycle_interval_secs: Option<u64>,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn apply(&self, config: &mut EvolutionConfig) {
        if let Some(n) = self.population_size {
            config.population_size = n;
        }
        if let Some(k) = self.tournament_size {
            config.tournament_size = k;
        }
        if let Some(kind) = self.evaluator {
            config.evaluator = kind;
        }
        if let Some(n) = self.evaluation_concurrency {
            config.evaluation_concurrency = n;
        }
        if let Some(secs) = self.cycle_interval_secs {
            config.cycle_interval_secs = secs;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,strategy_factory=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,strategy_factory=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await?,
        Commands::Once(args) => cmd_once(args).await?,
        Commands::Tail { stream, limit } => cmd_tail(&stream, limit).await?,
        Commands::Families => cmd_families()?,
    }

    Ok(())
}

// ============================================================================
// Engine wiring
// ============================================================================

async fn build_engine(args: &RunArgs) -> anyhow::Result<EvolutionEngine> {
    let mut config = config::from_env()?;
    args.apply(&mut config);
    config.validate()?;

    let registry = Arc::new(FamilyRegistry::builtin());
    let evaluator = build_evaluator(&config, registry.clone())?;

    let sink: Arc<dyn StreamSink> = if args.dry_run {
        info!("Dry run: publishing to in-memory stream");
        Arc::new(MemoryStream::new())
    } else {
        let db_path = config::stream_db_path();
        let db = persistence::Database::new(&db_path).await.map_err(|e| {
            error!("Failed to initialize stream store: {}", e);
            anyhow::anyhow!("Stream store initialization failed: {}", e)
        })?;
        info!("Stream store initialized: {}", db_path);
        Arc::new(SqliteStreamSink::new(db.pool_clone(), PRODUCER))
    };

    info!(
        evaluator = evaluator.name(),
        population_size = config.population_size,
        tournament_size = config.tournament_size,
        elites = config.elite_count(),
        elites_breed = config.elites_breed,
        seed = ?config.seed,
        "Configuration loaded"
    );

    Ok(EvolutionEngine::new(
        config,
        registry,
        evaluator,
        ResultPublisher::new(sink),
    )?)
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    info!("Strategy Factory v{} starting...", APP_VERSION);
    let mut engine = build_engine(&args).await?;

    let progress = engine.progress();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, stopping after the current step...");
        progress.cancel();
    });

    engine.run().await;
    Ok(())
}

async fn cmd_once(args: RunArgs) -> anyhow::Result<()> {
    info!("Strategy Factory v{} (single cycle)", APP_VERSION);
    let mut engine = build_engine(&args).await?;

    let seeded = engine.seed().await;
    let report = engine.run_cycle().await?;

    println!("\n=== Generation {} ===", report.generation);
    println!(
        "Seeded: {} | Evaluated: {} | Failures: {} | Defaulted: {} | Jobs: {}",
        seeded, report.evaluated, report.evaluation_failures, report.defaulted, report.jobs_submitted
    );
    println!(
        "Best fitness: {} | Published: {}/{} | {} ms",
        report
            .best_fitness
            .map(|f| format!("{f:.3}"))
            .unwrap_or_else(|| "-".to_string()),
        report.specs_published,
        report.population_size,
        report.elapsed_ms
    );

    println!("\n  {:<60} {:<22} {:>8}", "ID", "FAMILY", "FITNESS");
    println!("  {}", "-".repeat(92));
    for genome in engine.population() {
        let marker = if report.elite_ids.iter().any(|id| id == genome.id()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<60} {:<22} {:>8.3}",
            marker,
            genome.id(),
            genome.family().as_str(),
            genome.fitness()
        );
    }
    println!("\n  * elite carried over unchanged");

    Ok(())
}

async fn cmd_tail(stream: &str, limit: i64) -> anyhow::Result<()> {
    let db_path = config::stream_db_path();
    let db = persistence::Database::new(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Stream store initialization failed: {}", e))?;
    let repo = StreamRepository::new(db.pool());

    let total = repo.count(stream).await?;
    println!("Stream {} in {} ({} entries)", stream, db_path, total);

    for entry in repo.latest(stream, limit).await? {
        let at = entry
            .created_at_utc()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("{:>8}  {}  {}", entry.id, at, entry.payload);
    }

    Ok(())
}

fn cmd_families() -> anyhow::Result<()> {
    let registry = FamilyRegistry::builtin();
    println!("{} registered families\n", registry.len());
    for family in registry.families() {
        let params = serde_json::to_string(&registry.default_params(family))?;
        println!("  {:<22} {}", family.as_str(), params);
    }
    Ok(())
}
