//! Result publisher — hands genome specs and evaluation outcomes to named streams
//!
//! Delivery is best-effort: a failed write is logged and reported as `false`,
//! never propagated. Consumers must tolerate repeated ids.

use async_trait::async_trait;
use chrono::Utc;
use persistence::repository::StreamRepository;
use persistence::SqlitePool;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::PublishError;
use crate::genome::StrategyGenome;
use crate::types::StrategySpec;

pub const STRATEGY_SPECS: &str = "strategy_specs";
pub const BACKTEST_JOBS_SUBMITTED: &str = "backtest_jobs_submitted";
pub const BACKTEST_RESULTS: &str = "backtest_results";

const INTERNAL_SIMULATION: &str = "internal_simulation";

/// Append-only destination for stream messages
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Append `payload` to `stream`, returning the entry id
    async fn append(&self, stream: &str, payload: serde_json::Value)
        -> Result<String, PublishError>;
}

// ============================================================================
// Sinks
// ============================================================================

/// In-process stream log
#[derive(Default)]
pub struct MemoryStream {
    entries: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads of `stream` in append order
    pub fn entries(&self, stream: &str) -> Vec<serde_json::Value> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(s, _)| s == stream)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn len(&self, stream: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(s, _)| s == stream)
            .count()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[async_trait]
impl StreamSink for MemoryStream {
    async fn append(
        &self,
        stream: &str,
        payload: serde_json::Value,
    ) -> Result<String, PublishError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push((stream.to_string(), payload));
        Ok(entries.len().to_string())
    }
}

/// Stream log persisted in SQLite through the persistence crate
pub struct SqliteStreamSink {
    pool: SqlitePool,
    producer: String,
}

impl SqliteStreamSink {
    pub fn new(pool: SqlitePool, producer: impl Into<String>) -> Self {
        Self {
            pool,
            producer: producer.into(),
        }
    }
}

#[async_trait]
impl StreamSink for SqliteStreamSink {
    async fn append(
        &self,
        stream: &str,
        payload: serde_json::Value,
    ) -> Result<String, PublishError> {
        let id = StreamRepository::new(&self.pool)
            .append(stream, &payload, Some(&self.producer))
            .await?;
        Ok(id.to_string())
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Serialize)]
struct JobSubmittedMessage<'a> {
    job_id: &'a str,
    strategy_id: &'a str,
    spec: StrategySpec,
}

#[derive(Debug, Serialize)]
struct BacktestResultMessage<'a> {
    strategy_id: &'a str,
    fitness: f64,
    backtest_type: &'static str,
    spec: StrategySpec,
    timestamp: i64,
}

// ============================================================================
// Publisher
// ============================================================================

#[derive(Clone)]
pub struct ResultPublisher {
    sink: Arc<dyn StreamSink>,
}

impl ResultPublisher {
    pub fn new(sink: Arc<dyn StreamSink>) -> Self {
        Self { sink }
    }

    /// `strategy_specs`: `{id, family, params, fitness}`
    pub async fn publish_spec(&self, genome: &StrategyGenome) -> bool {
        self.publish(STRATEGY_SPECS, genome.id(), &genome.to_spec())
            .await
    }

    /// `backtest_jobs_submitted`: `{job_id, strategy_id, spec}`
    pub async fn publish_job_submitted(&self, genome: &StrategyGenome, job_id: &str) -> bool {
        let message = JobSubmittedMessage {
            job_id,
            strategy_id: genome.id(),
            spec: genome.to_spec(),
        };
        self.publish(BACKTEST_JOBS_SUBMITTED, genome.id(), &message)
            .await
    }

    /// `backtest_results`: internally simulated score for one genome
    pub async fn publish_backtest_result(&self, genome: &StrategyGenome) -> bool {
        let message = BacktestResultMessage {
            strategy_id: genome.id(),
            fitness: genome.fitness(),
            backtest_type: INTERNAL_SIMULATION,
            spec: genome.to_spec(),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(BACKTEST_RESULTS, genome.id(), &message).await
    }

    async fn publish<T: Serialize>(&self, stream: &str, strategy_id: &str, message: &T) -> bool {
        let result = match serde_json::to_value(message) {
            Ok(payload) => self.sink.append(stream, payload).await,
            Err(e) => Err(PublishError::from(e)),
        };

        match result {
            Ok(entry_id) => {
                debug!(stream, strategy_id, entry_id = %entry_id, "Published");
                true
            }
            Err(e) => {
                warn!(stream, strategy_id, error = %e, "Publish failed");
                false
            }
        }
    }
}
