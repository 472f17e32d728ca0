//! Backtest platform client — submits strategy specs for historical simulation
//!
//! The platform runs jobs asynchronously: a successful submission only yields a
//! job id, results arrive out-of-band.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::BacktestApiConfig;
use crate::error::EvaluationError;
use crate::types::StrategySpec;

#[derive(Debug, Serialize)]
struct BacktestSubmission<'a> {
    strategy_spec: &'a StrategySpec,
    lookback_days: u32,
    initial_capital: f64,
}

/// Authenticated backtest platform client
#[derive(Clone)]
pub struct BacktestClient {
    client: Client,
    base_url: String,
    api_key: String,
    lookback_days: u32,
    initial_capital: f64,
}

impl BacktestClient {
    pub fn new(config: &BacktestApiConfig) -> Result<Self, EvaluationError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            lookback_days: config.lookback_days,
            initial_capital: config.initial_capital,
        })
    }

    /// Submit a spec and return the platform's job id.
    ///
    /// Only HTTP 200 counts as accepted. Timeouts surface as transport errors.
    pub async fn submit(&self, spec: &StrategySpec) -> Result<String, EvaluationError> {
        let url = format!("{}/backtest", self.base_url);
        let body = BacktestSubmission {
            strategy_spec: spec,
            lookback_days: self.lookback_days,
            initial_capital: self.initial_capital,
        };

        debug!(strategy_id = %spec.id, %url, "Submitting backtest");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EvaluationError::MalformedResponse(e.to_string()))?;

        let job_id = match payload.get("job_id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(EvaluationError::MalformedResponse(format!(
                    "no job_id in {payload}"
                )))
            }
        };

        info!(strategy_id = %spec.id, job_id = %job_id, "Backtest submitted");
        Ok(job_id)
    }
}
