//! Configuration for edge-bot.
//!
//! Loaded from a TOML file with environment variable overrides for
//! credentials and CLI overrides for mode/assets/bankroll. `validate()`
//! rejects inconsistent limits before the engine starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use edge_common::CryptoAsset;

/// Trading mode determines which collaborators are wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Real order placement through a live transport collaborator.
    Live,
    /// Simulated fills against live-shaped data.
    Paper,
}

impl TradingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(TradingMode::Live),
            "paper" => Some(TradingMode::Paper),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// How credits from fired signals combine toward the entry bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreditStacking {
    /// Credits sum across all fired signals.
    #[default]
    Additive,
    /// Only the single highest-weight fired signal counts, plus the
    /// value signal.
    Best,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Trading mode: live or paper.
    pub mode: TradingMode,

    /// Assets to trade.
    pub assets: Vec<CryptoAsset>,

    /// Logging level.
    pub log_level: String,

    /// Total capital in USDC used for sizing and risk caps.
    pub bankroll: Decimal,

    /// Path of the closed-trade CSV journal.
    pub journal_path: PathBuf,

    pub trading: TradingConfig,
    pub signals: SignalConfig,
    pub risk: RiskLimits,
    pub position: PositionConfig,
    pub strategies: StrategyConfig,
    pub passive: PassiveConfig,
    pub telemetry: TelemetryConfig,
    pub reconcile: ReconcileConfig,
    pub wallet: WalletConfig,
}

/// Cadences, stake bounds, and entry plumbing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Scan (signal evaluation + entry) interval, seconds.
    pub scan_interval_secs: u64,
    /// Spot/funding telemetry refresh interval, seconds.
    pub feed_interval_secs: u64,
    /// Open-position monitor interval, seconds.
    pub monitor_interval_secs: u64,
    /// Catalyst flag poll interval, seconds.
    pub catalyst_poll_secs: u64,
    /// Reconciliation interval, seconds (independent of scan/monitor).
    pub reconcile_interval_secs: u64,

    /// Maximum simultaneous open positions.
    pub max_positions: usize,
    /// Minimum stake per trade (USDC).
    pub min_stake: Decimal,
    /// Hard cap per trade (USDC).
    pub max_stake: Decimal,
    /// Kelly fraction applied to the full-Kelly stake (0.25 = quarter Kelly).
    pub kelly_fraction: Decimal,
    /// Cap on stake as a fraction of bankroll.
    pub max_bankroll_fraction: Decimal,
    /// Max slippage above mid accepted on entry limit prices.
    pub slippage_tolerance: Decimal,
    /// Bounded timeout on order placement, milliseconds.
    pub order_timeout_ms: u64,
    /// Only enter markets with at least this long to resolution, seconds.
    pub min_time_remaining_secs: i64,
    /// Credit combination policy.
    pub credit_stacking: CreditStacking,
}

impl TradingConfig {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }
}

/// Base signal thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Minimum probability edge required to trade.
    pub min_edge: Decimal,
    /// Default probability boost when no strategy signal fires.
    pub base_boost: Decimal,
    /// Extra boost when negative funding aligns with a YES consensus.
    pub funding_alignment_boost: Decimal,
    /// Funding rate below which the alignment boost applies.
    pub funding_alignment_threshold: Decimal,

    /// Depth share on one side required for the imbalance signal.
    pub ob_imbalance_threshold: Decimal,
    /// Book levels inspected for depth.
    pub ob_depth_levels: usize,
    /// Mid below this fires the imbalance fallback toward YES.
    pub ob_extreme_low: Decimal,
    /// Mid above this fires the imbalance fallback toward NO.
    pub ob_extreme_high: Decimal,

    /// Ticks inspected by the momentum signal.
    pub momentum_window: usize,
    /// Minimum total move across the window.
    pub momentum_min_move: Decimal,
    /// Share of ticks that must move in the same direction.
    pub momentum_consistency: Decimal,

    /// Ticks in the volume baseline.
    pub volume_window: usize,
    /// Recent volume must exceed baseline by this multiple.
    pub volume_spike_multiplier: Decimal,
}

/// Risk gate limits read by the evaluator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Max open exposure as a fraction of bankroll.
    pub max_portfolio_risk: Decimal,
    /// Max single-trade stake as a fraction of bankroll.
    pub per_trade_risk: Decimal,
    /// Session realized-loss limit as a fraction of bankroll.
    pub session_loss_limit: Decimal,
    /// Max entries in any rolling hour.
    pub max_trades_per_hour: usize,
    /// Consecutive losses after which the edge bar is raised.
    pub loss_streak_threshold: u32,
    /// Extra edge required while in a loss streak.
    pub loss_streak_extra_edge: Decimal,
}

/// Exit thresholds for the position monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Exit when price reaches this multiple of entry.
    pub take_profit_multiplier: Decimal,
    /// Exit when effective price drops to this absolute level.
    pub stop_loss_threshold: Decimal,
    /// Force-exit this many seconds before market resolution.
    pub time_stop_buffer_secs: i64,
    /// Ignore the stop loss for the first seconds of a position's life.
    pub min_hold_secs: i64,
}

/// Per-strategy knobs. Credit weights and thresholds live in the
/// router's profile table; these are the tunable market parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Asset whose evaluation publishes the broadcast signal.
    pub anchor: CryptoAsset,
    pub eligibility: EligibilityConfig,
    pub carry: CarryConfig,
    pub lag: LagConfig,
    pub squeeze: SqueezeConfig,
    pub catalyst: CatalystConfig,
}

/// Time-of-day eligibility for directional strategies (UTC hours).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Anchor-asset momentum carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CarryConfig {
    /// Move from window open required to fire.
    pub threshold: Decimal,
    /// Kill switch: do not fire if the move already exceeds this.
    pub max_entry_move: Decimal,
    /// Share of recent spot ticks that must align with the move.
    pub consistency: Decimal,
}

/// Dependent-asset lag follow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Anchor move required before a broadcast is published.
    pub min_anchor_move: Decimal,
    /// Market odds must still be within this of 0.50.
    pub max_repricing: Decimal,
    /// Broadcast validity window, seconds.
    pub expiry_secs: i64,
    /// Probability boost when the lag signal fires.
    pub boost: Decimal,
}

/// Funding-squeeze reversal.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqueezeConfig {
    /// Funding must be at or below this (negative) rate.
    pub funding_threshold: Decimal,
    /// RSI must be below this.
    pub rsi_oversold: Decimal,
    /// Kill switch: only enter in the first minutes of a window.
    pub max_entry_minutes: i64,
    /// Uptick from the local low required for confirmation.
    pub min_uptick: Decimal,
    /// Probability boost when the squeeze signal fires.
    pub boost: Decimal,
}

/// Catalyst-driven profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalystConfig {
    /// Whether the catalyst asset may trade at all without a flag.
    pub required: bool,
    /// Flag auto-expiry, minutes.
    pub expiry_minutes: i64,
    /// Probability boost when the catalyst signal fires.
    pub boost: Decimal,
    /// Flag file polled by the watcher.
    pub flag_path: PathBuf,
}

/// Passive (maker) quoting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PassiveConfig {
    pub enabled: bool,
    /// Assets eligible for passive pairs.
    pub assets: Vec<CryptoAsset>,
    /// Distance between the paired quotes.
    pub spread_target: Decimal,
    /// Per-side position in USDC.
    pub max_position: Decimal,
    /// Book is quiet when recent tick stddev is below this.
    pub max_tick_stddev: Decimal,
    /// Forget a pair record after this long, seconds.
    pub pair_ttl_secs: i64,
    /// Cancel the pair if the mid moves this far from placement.
    pub volatility_kill: Decimal,
    /// Quiet hours (UTC) during which quoting runs.
    pub hours_start: u32,
    pub hours_end: u32,
}

/// Telemetry store sizing and cache freshness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Spot ticks retained per asset.
    pub tick_capacity: usize,
    /// Funding cache TTL, seconds.
    pub funding_ttl_secs: i64,
}

/// Reconciliation tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// A local position missing externally for this long is stale, seconds.
    pub grace_secs: i64,
    /// Ignore external dust below this share count.
    pub min_size: Decimal,
}

/// Wallet credentials (environment only, never the config file).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub private_key: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            assets: vec![
                CryptoAsset::Btc,
                CryptoAsset::Eth,
                CryptoAsset::Sol,
                CryptoAsset::Xrp,
            ],
            log_level: "info".to_string(),
            bankroll: dec!(1000),
            journal_path: PathBuf::from("trades.csv"),
            trading: TradingConfig::default(),
            signals: SignalConfig::default(),
            risk: RiskLimits::default(),
            position: PositionConfig::default(),
            strategies: StrategyConfig::default(),
            passive: PassiveConfig::default(),
            telemetry: TelemetryConfig::default(),
            reconcile: ReconcileConfig::default(),
            wallet: WalletConfig::default(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            feed_interval_secs: 5,
            monitor_interval_secs: 15,
            catalyst_poll_secs: 30,
            reconcile_interval_secs: 120,
            max_positions: 20,
            min_stake: dec!(5),
            max_stake: dec!(100),
            kelly_fraction: dec!(0.25),
            max_bankroll_fraction: dec!(0.08),
            slippage_tolerance: dec!(0.02),
            order_timeout_ms: 10_000,
            min_time_remaining_secs: 60,
            credit_stacking: CreditStacking::Additive,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_edge: dec!(0.03),
            base_boost: dec!(0.08),
            funding_alignment_boost: dec!(0.02),
            funding_alignment_threshold: dec!(-0.0005),
            ob_imbalance_threshold: dec!(0.52),
            ob_depth_levels: 5,
            ob_extreme_low: dec!(0.42),
            ob_extreme_high: dec!(0.58),
            momentum_window: 5,
            momentum_min_move: dec!(0.01),
            momentum_consistency: dec!(0.60),
            volume_window: 10,
            volume_spike_multiplier: dec!(1.5),
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_portfolio_risk: dec!(0.50),
            per_trade_risk: dec!(0.10),
            session_loss_limit: dec!(0.20),
            max_trades_per_hour: 20,
            loss_streak_threshold: 2,
            loss_streak_extra_edge: dec!(0.02),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            take_profit_multiplier: dec!(1.8),
            stop_loss_threshold: dec!(0.35),
            time_stop_buffer_secs: 90,
            min_hold_secs: 30,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            anchor: CryptoAsset::Btc,
            eligibility: EligibilityConfig::default(),
            carry: CarryConfig::default(),
            lag: LagConfig::default(),
            squeeze: SqueezeConfig::default(),
            catalyst: CatalystConfig::default(),
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // 9 AM - 4 PM New York expressed in UTC.
            start_hour: 14,
            end_hour: 21,
        }
    }
}

impl Default for CarryConfig {
    fn default() -> Self {
        Self {
            threshold: dec!(0.003),
            max_entry_move: dec!(0.015),
            consistency: dec!(0.70),
        }
    }
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            min_anchor_move: dec!(0.004),
            max_repricing: dec!(0.08),
            expiry_secs: 90,
            boost: dec!(0.12),
        }
    }
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            funding_threshold: dec!(-0.001),
            rsi_oversold: dec!(38),
            max_entry_minutes: 3,
            min_uptick: dec!(0.002),
            boost: dec!(0.15),
        }
    }
}

impl Default for CatalystConfig {
    fn default() -> Self {
        Self {
            required: true,
            expiry_minutes: 60,
            boost: dec!(0.18),
            flag_path: PathBuf::from("catalyst_flag.json"),
        }
    }
}

impl Default for PassiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            assets: vec![CryptoAsset::Btc, CryptoAsset::Eth],
            spread_target: dec!(0.04),
            max_position: dec!(50),
            max_tick_stddev: dec!(0.005),
            pair_ttl_secs: 300,
            volatility_kill: dec!(0.008),
            // 11 PM - 5 AM New York expressed in UTC.
            hours_start: 4,
            hours_end: 10,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            tick_capacity: 120,
            funding_ttl_secs: 300,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_secs: 300,
            min_size: dec!(0.01),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    /// Apply environment variable overrides for sensitive values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("EDGE_PRIVATE_KEY") {
            self.wallet.private_key = Some(key);
        }
        if let Ok(key) = std::env::var("EDGE_API_KEY") {
            self.wallet.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("EDGE_API_SECRET") {
            self.wallet.api_secret = Some(secret);
        }
        if let Ok(pass) = std::env::var("EDGE_API_PASSPHRASE") {
            self.wallet.api_passphrase = Some(pass);
        }
        if let Ok(bankroll) = std::env::var("EDGE_BANKROLL") {
            if let Ok(value) = bankroll.parse::<Decimal>() {
                self.bankroll = value;
            }
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        mode: Option<String>,
        assets: Option<Vec<CryptoAsset>>,
        bankroll: Option<Decimal>,
    ) {
        if let Some(mode_str) = mode {
            if let Some(m) = TradingMode::parse(&mode_str) {
                self.mode = m;
            }
        }
        if let Some(asset_list) = assets {
            if !asset_list.is_empty() {
                self.assets = asset_list;
            }
        }
        if let Some(b) = bankroll {
            self.bankroll = b;
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.mode == TradingMode::Live && self.wallet.private_key.is_none() {
            bail!("Live mode requires EDGE_PRIVATE_KEY environment variable");
        }
        if self.assets.is_empty() {
            bail!("At least one asset must be configured");
        }
        if self.bankroll <= Decimal::ZERO {
            bail!("bankroll must be positive");
        }
        if self.trading.min_stake > self.trading.max_stake {
            bail!("min_stake cannot exceed max_stake");
        }
        if self.trading.kelly_fraction <= Decimal::ZERO
            || self.trading.kelly_fraction > Decimal::ONE
        {
            bail!("kelly_fraction must be in (0, 1]");
        }
        if self.risk.max_portfolio_risk <= Decimal::ZERO
            || self.risk.max_portfolio_risk > Decimal::ONE
        {
            bail!("max_portfolio_risk must be in (0, 1]");
        }
        if self.risk.per_trade_risk > self.risk.max_portfolio_risk {
            bail!("per_trade_risk cannot exceed max_portfolio_risk");
        }
        if self.position.take_profit_multiplier <= Decimal::ONE {
            bail!("take_profit_multiplier must be above 1.0");
        }
        if self.position.time_stop_buffer_secs <= 0 {
            bail!("time_stop_buffer_secs must be positive");
        }
        if self.signals.min_edge <= Decimal::ZERO {
            bail!("min_edge must be positive");
        }
        if self.strategies.eligibility.start_hour > 23 || self.strategies.eligibility.end_hour > 23
        {
            bail!("eligibility hours must be 0-23");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        BotConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_toml_overrides() {
        let config = BotConfig::from_toml_str(
            r#"
            mode = "paper"
            assets = ["BTC", "ETH"]
            bankroll = 2500.0

            [trading]
            scan_interval_secs = 10
            credit_stacking = "best"

            [signals]
            min_edge = 0.05

            [strategies.lag]
            expiry_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, TradingMode::Paper);
        assert_eq!(config.assets, vec![CryptoAsset::Btc, CryptoAsset::Eth]);
        assert_eq!(config.bankroll, dec!(2500));
        assert_eq!(config.trading.scan_interval_secs, 10);
        assert_eq!(config.trading.credit_stacking, CreditStacking::Best);
        assert_eq!(config.signals.min_edge, dec!(0.05));
        assert_eq!(config.strategies.lag.expiry_secs, 120);
        // Untouched sections keep defaults.
        assert_eq!(config.trading.max_positions, 20);
    }

    #[test]
    fn test_live_mode_requires_key() {
        let mut config = BotConfig::default();
        config.mode = TradingMode::Live;
        assert!(config.validate().is_err());

        config.wallet.private_key = Some("0xabc".into());
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = BotConfig::default();
        config.trading.min_stake = dec!(500);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.risk.per_trade_risk = dec!(0.9);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.position.take_profit_multiplier = dec!(0.9);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = BotConfig::default();
        config.apply_cli_overrides(
            Some("live".into()),
            Some(vec![CryptoAsset::Sol]),
            Some(dec!(750)),
        );
        assert_eq!(config.mode, TradingMode::Live);
        assert_eq!(config.assets, vec![CryptoAsset::Sol]);
        assert_eq!(config.bankroll, dec!(750));
    }
}
