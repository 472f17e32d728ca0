//! Shared types for the strategy evolution engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed category of trading heuristic. Determines a genome's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyFamily {
    #[serde(rename = "momentum_5m")]
    Momentum,
    #[serde(rename = "mean_revert_1h")]
    MeanReversion,
    #[serde(rename = "social_buzz")]
    SocialSignal,
    #[serde(rename = "liquidity_migration")]
    LiquidityMigration,
    #[serde(rename = "perp_basis_arb")]
    BasisArbitrage,
    #[serde(rename = "dev_wallet_drain")]
    InsiderDrain,
    #[serde(rename = "airdrop_rotation")]
    AirdropRotation,
    #[serde(rename = "korean_time_burst")]
    RegionalBurst,
    #[serde(rename = "bridge_inflow")]
    BridgeInflow,
    #[serde(rename = "rug_pull_sniffer")]
    RugDetection,
}

impl StrategyFamily {
    pub fn all() -> &'static [StrategyFamily] {
        &[
            StrategyFamily::Momentum,
            StrategyFamily::MeanReversion,
            StrategyFamily::SocialSignal,
            StrategyFamily::LiquidityMigration,
            StrategyFamily::BasisArbitrage,
            StrategyFamily::InsiderDrain,
            StrategyFamily::AirdropRotation,
            StrategyFamily::RegionalBurst,
            StrategyFamily::BridgeInflow,
            StrategyFamily::RugDetection,
        ]
    }

    /// Wire name used in ids and published specs
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyFamily::Momentum => "momentum_5m",
            StrategyFamily::MeanReversion => "mean_revert_1h",
            StrategyFamily::SocialSignal => "social_buzz",
            StrategyFamily::LiquidityMigration => "liquidity_migration",
            StrategyFamily::BasisArbitrage => "perp_basis_arb",
            StrategyFamily::InsiderDrain => "dev_wallet_drain",
            StrategyFamily::AirdropRotation => "airdrop_rotation",
            StrategyFamily::RegionalBurst => "korean_time_burst",
            StrategyFamily::BridgeInflow => "bridge_inflow",
            StrategyFamily::RugDetection => "rug_pull_sniffer",
        }
    }
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single strategy parameter. The variant is fixed for the lifetime of the key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Real(v) => v,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, ParamValue::Int(_))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{v:.4}"),
        }
    }
}

/// Parameter name → value. Ordered so that seeded runs iterate deterministically.
pub type Params = BTreeMap<String, ParamValue>;

/// Transport representation of a genome; the only form that crosses the publisher boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub id: String,
    pub family: StrategyFamily,
    pub params: Params,
    pub fitness: f64,
}
