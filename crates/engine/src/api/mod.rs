//! HTTP clients for external services

pub mod backtest;

pub use backtest::BacktestClient;
