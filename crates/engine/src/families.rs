//! Family registry — per-family parameter schema and fitness heuristic
//!
//! Each strategy family registers a profile: a function producing its canonical
//! default parameters and a function scoring those parameters for the internal
//! simulator. Adding a family means registering a profile, nothing else.

use crate::types::{ParamValue, Params, StrategyFamily};

pub type DefaultParamsFn = fn() -> Params;
pub type FitnessBonusFn = fn(&Params) -> f64;

#[derive(Debug, Clone, Copy)]
pub struct FamilyProfile {
    pub family: StrategyFamily,
    pub defaults: DefaultParamsFn,
    pub bonus: FitnessBonusFn,
}

/// Ordered lookup table from family to profile. Order drives seeding order.
#[derive(Debug, Clone, Default)]
pub struct FamilyRegistry {
    profiles: Vec<FamilyProfile>,
}

impl FamilyRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the ten built-in families
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(FamilyProfile {
            family: StrategyFamily::Momentum,
            defaults: momentum_defaults,
            bonus: momentum_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::MeanReversion,
            defaults: mean_reversion_defaults,
            bonus: mean_reversion_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::SocialSignal,
            defaults: social_defaults,
            bonus: social_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::LiquidityMigration,
            defaults: liquidity_defaults,
            bonus: liquidity_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::BasisArbitrage,
            defaults: basis_defaults,
            bonus: basis_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::InsiderDrain,
            defaults: insider_drain_defaults,
            bonus: insider_drain_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::AirdropRotation,
            defaults: airdrop_defaults,
            bonus: airdrop_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::RegionalBurst,
            defaults: regional_burst_defaults,
            bonus: regional_burst_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::BridgeInflow,
            defaults: bridge_defaults,
            bonus: bridge_bonus,
        });
        registry.register(FamilyProfile {
            family: StrategyFamily::RugDetection,
            defaults: rug_defaults,
            bonus: rug_bonus,
        });
        registry
    }

    /// Register a profile, replacing any existing profile for the same family
    pub fn register(&mut self, profile: FamilyProfile) {
        match self.profiles.iter_mut().find(|p| p.family == profile.family) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    pub fn get(&self, family: StrategyFamily) -> Option<&FamilyProfile> {
        self.profiles.iter().find(|p| p.family == family)
    }

    pub fn families(&self) -> impl Iterator<Item = StrategyFamily> + '_ {
        self.profiles.iter().map(|p| p.family)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Canonical defaults; an unregistered family gets an empty parameter set
    pub fn default_params(&self, family: StrategyFamily) -> Params {
        self.get(family).map(|p| (p.defaults)()).unwrap_or_default()
    }

    /// Family-specific fitness bonus; zero for unregistered families
    pub fn bonus(&self, family: StrategyFamily, params: &Params) -> f64 {
        self.get(family).map(|p| (p.bonus)(params)).unwrap_or(0.0)
    }

    pub fn canonical_keys(&self, family: StrategyFamily) -> Vec<String> {
        self.default_params(family).into_keys().collect()
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn params(entries: &[(&str, ParamValue)]) -> Params {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

fn momentum_defaults() -> Params {
    params(&[
        ("lookback", ParamValue::Int(5)),
        ("vol_multiplier", ParamValue::Real(2.0)),
        ("price_change_threshold", ParamValue::Real(0.05)),
    ])
}

fn mean_reversion_defaults() -> Params {
    params(&[
        ("period_hours", ParamValue::Int(1)),
        ("z_score_threshold", ParamValue::Real(2.0)),
    ])
}

fn social_defaults() -> Params {
    params(&[
        ("lookback_minutes", ParamValue::Int(10)),
        ("std_dev_threshold", ParamValue::Real(2.5)),
    ])
}

fn liquidity_defaults() -> Params {
    params(&[("min_volume_migrate_usd", ParamValue::Real(50_000.0))])
}

fn basis_defaults() -> Params {
    params(&[("basis_threshold_pct", ParamValue::Real(0.5))])
}

fn insider_drain_defaults() -> Params {
    params(&[("dev_balance_threshold_pct", ParamValue::Real(2.0))])
}

fn airdrop_defaults() -> Params {
    params(&[("min_new_holders", ParamValue::Int(100))])
}

fn regional_burst_defaults() -> Params {
    params(&[("volume_multiplier_threshold", ParamValue::Real(1.5))])
}

fn bridge_defaults() -> Params {
    params(&[("min_bridge_volume_usd", ParamValue::Real(100_000.0))])
}

fn rug_defaults() -> Params {
    params(&[
        ("price_drop_pct", ParamValue::Real(0.8)),
        ("volume_multiplier", ParamValue::Real(5.0)),
    ])
}

// ============================================================================
// Fitness bonuses
// ============================================================================

fn value(params: &Params, key: &str) -> Option<f64> {
    params.get(key).map(ParamValue::as_f64)
}

/// `hit` when the parameter lies inside [lo, hi], `miss` otherwise, 0 when absent
fn banded(params: &Params, key: &str, lo: f64, hi: f64, hit: f64, miss: f64) -> f64 {
    match value(params, key) {
        Some(v) if (lo..=hi).contains(&v) => hit,
        Some(_) => miss,
        None => 0.0,
    }
}

fn momentum_bonus(p: &Params) -> f64 {
    value(p, "vol_multiplier")
        .map(|v| ((v - 1.0).max(0.0) * 0.4).min(1.2))
        .unwrap_or(0.0)
}

fn mean_reversion_bonus(p: &Params) -> f64 {
    banded(p, "z_score_threshold", 1.5, 2.5, 0.6, 0.15)
}

fn social_bonus(p: &Params) -> f64 {
    banded(p, "lookback_minutes", 5.0, 15.0, 0.7, 0.1)
        + banded(p, "std_dev_threshold", 2.0, 3.0, 0.2, 0.0)
}

fn liquidity_bonus(p: &Params) -> f64 {
    banded(p, "min_volume_migrate_usd", 25_000.0, 100_000.0, 0.5, 0.15)
}

fn basis_bonus(p: &Params) -> f64 {
    value(p, "basis_threshold_pct")
        .map(|v| (v.max(0.0) * 0.8).min(1.0))
        .unwrap_or(0.0)
}

fn insider_drain_bonus(p: &Params) -> f64 {
    banded(p, "dev_balance_threshold_pct", 1.0, 3.0, 0.55, 0.1)
}

fn airdrop_bonus(p: &Params) -> f64 {
    value(p, "min_new_holders")
        .map(|v| (v.max(0.0) / 200.0).min(0.8))
        .unwrap_or(0.0)
}

fn regional_burst_bonus(p: &Params) -> f64 {
    banded(p, "volume_multiplier_threshold", 1.2, 2.0, 0.45, 0.05)
}

fn bridge_bonus(p: &Params) -> f64 {
    value(p, "min_bridge_volume_usd")
        .map(|v| (v.max(0.0) / 200_000.0).min(0.9))
        .unwrap_or(0.0)
}

fn rug_bonus(p: &Params) -> f64 {
    let drop = banded(p, "price_drop_pct", 0.5, 0.9, 0.4, 0.0);
    let volume = value(p, "volume_multiplier")
        .map(|v| (v.max(0.0) / 10.0).min(0.5))
        .unwrap_or(0.0);
    drop + volume
}
