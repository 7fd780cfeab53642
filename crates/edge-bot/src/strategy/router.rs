//! Asset -> strategy profile routing.
//!
//! The router is the single place where strategy selection lives: it
//! resolves a market's underlying asset from its description text and
//! hands back the profile that parameterizes the edge evaluator -
//! which strategy signal applies, the credit weights, the minimum
//! credit threshold, and the time-of-day eligibility window. Markets
//! whose asset cannot be resolved get a conservative default profile.
//!
//! Cross-asset coupling (the anchor broadcast consumed by lag-follow)
//! is wired here, not inside the evaluator: `order_for_scan` puts
//! anchor markets first so the broadcast write happens before any
//! dependent read in the same cycle.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use edge_common::CryptoAsset;

use crate::config::StrategyConfig;
use crate::strategy::signals::SignalName;
use crate::types::Market;

/// Which asset-specific strategy a profile runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Anchor-asset momentum carry.
    MomentumCarry,
    /// Dependent asset following the anchor broadcast.
    LagFollow,
    /// Funding-squeeze reversal.
    SqueezeReversal,
    /// Catalyst-flag driven entries only.
    CatalystDriven,
    /// Base signals only (unresolved assets).
    Baseline,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MomentumCarry => "MOMENTUM_CARRY",
            StrategyKind::LagFollow => "LAG_FOLLOW",
            StrategyKind::SqueezeReversal => "SQUEEZE",
            StrategyKind::CatalystDriven => "CATALYST",
            StrategyKind::Baseline => "BASELINE",
        }
    }

    /// The signal this strategy contributes, if any.
    pub fn signal(&self) -> Option<SignalName> {
        match self {
            StrategyKind::MomentumCarry => Some(SignalName::MomentumCarry),
            StrategyKind::LagFollow => Some(SignalName::LagFollow),
            StrategyKind::SqueezeReversal => Some(SignalName::SqueezeReversal),
            StrategyKind::CatalystDriven => Some(SignalName::Catalyst),
            StrategyKind::Baseline => None,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static credit weights per signal. Weights are constants of the
/// profile, not learned; composite high-conviction signals carry more
/// credit than base signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub book_imbalance: u32,
    pub momentum: u32,
    pub volume_spike: u32,
    pub value: u32,
    pub strategy: u32,
}

impl SignalWeights {
    pub const fn uniform(strategy: u32) -> Self {
        Self {
            book_imbalance: 1,
            momentum: 1,
            volume_spike: 1,
            value: 1,
            strategy,
        }
    }

    pub fn weight_for(&self, name: SignalName) -> u32 {
        match name {
            SignalName::BookImbalance => self.book_imbalance,
            SignalName::Momentum => self.momentum,
            SignalName::VolumeSpike => self.volume_spike,
            SignalName::Value => self.value,
            SignalName::MomentumCarry
            | SignalName::LagFollow
            | SignalName::SqueezeReversal
            | SignalName::Catalyst => self.strategy,
        }
    }
}

/// Time-of-day window (UTC hours, half-open, wraps midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl EligibilityWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// The per-asset evaluation profile the router hands the evaluator.
#[derive(Debug, Clone)]
pub struct AssetProfile {
    pub strategy: StrategyKind,
    pub weights: SignalWeights,
    /// Minimum total credits for the gate.
    pub min_credits: u32,
    /// Probability boost applied when the strategy signal fires.
    pub strategy_boost: Decimal,
    /// `None` means eligible continuously.
    pub eligibility: Option<EligibilityWindow>,
    /// When true, no trade is considered without an active catalyst.
    pub catalyst_required: bool,
}

/// A market paired with its routed profile.
#[derive(Debug, Clone)]
pub struct RoutedMarket {
    pub asset: Option<CryptoAsset>,
    pub profile: AssetProfile,
}

/// Maps markets to asset profiles.
#[derive(Debug, Clone)]
pub struct StrategyRouter {
    anchor: CryptoAsset,
    directional_window: Option<EligibilityWindow>,
    carry_boost: Decimal,
    lag_boost: Decimal,
    squeeze_boost: Decimal,
    catalyst_boost: Decimal,
    catalyst_required: bool,
}

impl StrategyRouter {
    pub fn new(config: &StrategyConfig, base_boost: Decimal) -> Self {
        let directional_window = config.eligibility.enabled.then_some(EligibilityWindow {
            start_hour: config.eligibility.start_hour,
            end_hour: config.eligibility.end_hour,
        });
        Self {
            anchor: config.anchor,
            directional_window,
            carry_boost: base_boost,
            lag_boost: config.lag.boost,
            squeeze_boost: config.squeeze.boost,
            catalyst_boost: config.catalyst.boost,
            catalyst_required: config.catalyst.required,
        }
    }

    pub fn anchor(&self) -> CryptoAsset {
        self.anchor
    }

    /// Resolve a market to its profile.
    pub fn route(&self, market: &Market) -> RoutedMarket {
        let asset = CryptoAsset::from_description(&market.question);
        let profile = match asset {
            Some(asset) => self.profile_for(asset),
            None => Self::default_profile(),
        };
        RoutedMarket { asset, profile }
    }

    /// The profile table. Credit weights and thresholds are static
    /// per-asset constants; only boosts and windows come from config.
    pub fn profile_for(&self, asset: CryptoAsset) -> AssetProfile {
        if asset == self.anchor {
            return AssetProfile {
                strategy: StrategyKind::MomentumCarry,
                weights: SignalWeights::uniform(1),
                min_credits: 2,
                strategy_boost: self.carry_boost,
                eligibility: self.directional_window,
                catalyst_required: false,
            };
        }
        match asset {
            CryptoAsset::Eth => AssetProfile {
                strategy: StrategyKind::LagFollow,
                // The lag signal is a composite read (anchor move +
                // unrepriced odds) and carries double credit.
                weights: SignalWeights::uniform(2),
                min_credits: 3,
                strategy_boost: self.lag_boost,
                eligibility: self.directional_window,
                catalyst_required: false,
            },
            CryptoAsset::Sol => AssetProfile {
                strategy: StrategyKind::SqueezeReversal,
                weights: SignalWeights::uniform(1),
                min_credits: 2,
                strategy_boost: self.squeeze_boost,
                eligibility: self.directional_window,
                catalyst_required: false,
            },
            CryptoAsset::Xrp => AssetProfile {
                strategy: StrategyKind::CatalystDriven,
                // Catalyst carries triple credit: with the flag active,
                // the catalyst read alone meets the bar.
                weights: SignalWeights::uniform(3),
                min_credits: 3,
                strategy_boost: self.catalyst_boost,
                // Catalyst entries are event-driven and run 24/7.
                eligibility: None,
                catalyst_required: self.catalyst_required,
            },
            // The anchor arm above catches the configured anchor; a
            // non-default anchor leaves Btc handled here.
            CryptoAsset::Btc => AssetProfile {
                strategy: StrategyKind::Baseline,
                weights: SignalWeights::uniform(0),
                min_credits: 3,
                strategy_boost: Decimal::ZERO,
                eligibility: self.directional_window,
                catalyst_required: false,
            },
        }
    }

    /// Conservative profile for unresolved assets: every base signal
    /// must fire and no boost applies.
    pub fn default_profile() -> AssetProfile {
        AssetProfile {
            strategy: StrategyKind::Baseline,
            weights: SignalWeights::uniform(0),
            min_credits: 4,
            strategy_boost: Decimal::ZERO,
            eligibility: None,
            catalyst_required: false,
        }
    }

    /// Order markets so the anchor asset is evaluated first, ensuring
    /// its broadcast write happens before dependent reads in the same
    /// scan cycle.
    pub fn order_for_scan(&self, mut markets: Vec<Market>) -> Vec<Market> {
        markets.sort_by_key(|m| {
            CryptoAsset::from_description(&m.question) != Some(self.anchor)
        });
        markets
    }
}
