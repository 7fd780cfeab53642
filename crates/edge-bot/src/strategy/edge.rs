//! The trade gate: multi-signal consensus, probability-edge sizing,
//! and risk checks, folded into a single immutable `EdgeVerdict`.
//!
//! The evaluator is side-effect-free: it reads a market snapshot,
//! telemetry, the broadcast/catalyst state, and a risk snapshot, and
//! returns a verdict. It never places orders and never mutates shared
//! registries. A failed gate is a normal outcome, not an error - each
//! disqualifying reason is carried as a `GateRejection` and logged at
//! info level.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use edge_common::{CryptoAsset, Outcome};

use crate::config::{CreditStacking, RiskLimits, SignalConfig, StrategyConfig, TradingConfig};
use crate::risk::RiskSnapshot;
use crate::state::{BroadcastState, CatalystStore, TelemetrySnapshot};
use crate::strategy::router::{AssetProfile, StrategyKind};
use crate::strategy::signals::{
    self, SignalName, SignalOutcome, SignalReading,
};
use crate::strategy::specials;
use crate::types::Market;

/// Cap on the estimated probability after boosting.
const MAX_ESTIMATED_PROB: Decimal = dec!(0.95);

/// Reason a verdict failed the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateRejection {
    /// Market has no usable order book or mid price.
    NoMarketData,

    /// Too close to resolution to enter.
    InsufficientTime { remaining_secs: i64, min_secs: i64 },

    /// Directional profile outside its time-of-day window.
    OutsideEligibility,

    /// Catalyst-only profile with no active flag.
    CatalystRequired,

    /// Two fired signals resolved opposite directions.
    DirectionConflict,

    /// No fired signal resolved a direction.
    NoDirection,

    /// Total fired credit below the profile threshold.
    CreditShortfall { have: u32, need: u32 },

    /// Probability edge below the minimum.
    EdgeBelowMinimum { edge: Decimal, min: Decimal },

    /// Loss streak in effect and the edge does not clear the raised bar.
    LossStreakBar {
        streak: u32,
        edge: Decimal,
        required: Decimal,
    },

    /// Sized stake below the minimum order.
    StakeBelowMinimum { stake: Decimal, min: Decimal },

    /// Stake would push open exposure over the portfolio cap.
    PortfolioRiskExceeded {
        exposure: Decimal,
        stake: Decimal,
        cap: Decimal,
    },

    /// Rolling-hour entry cap reached.
    HourlyTradeCapReached { count: usize, cap: usize },

    /// Session realized loss beyond the limit.
    SessionLossLimit { loss: Decimal, cap: Decimal },
}

impl GateRejection {
    /// Short code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            GateRejection::NoMarketData => "NO_DATA",
            GateRejection::InsufficientTime { .. } => "TIME",
            GateRejection::OutsideEligibility => "HOURS",
            GateRejection::CatalystRequired => "NO_CATALYST",
            GateRejection::DirectionConflict => "DIR_CONFLICT",
            GateRejection::NoDirection => "NO_DIRECTION",
            GateRejection::CreditShortfall { .. } => "CREDITS",
            GateRejection::EdgeBelowMinimum { .. } => "EDGE",
            GateRejection::LossStreakBar { .. } => "LOSS_STREAK",
            GateRejection::StakeBelowMinimum { .. } => "STAKE",
            GateRejection::PortfolioRiskExceeded { .. } => "PORTFOLIO_RISK",
            GateRejection::HourlyTradeCapReached { .. } => "RATE_LIMIT",
            GateRejection::SessionLossLimit { .. } => "SESSION_LOSS",
        }
    }
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRejection::NoMarketData => write!(f, "no usable order book"),
            GateRejection::InsufficientTime {
                remaining_secs,
                min_secs,
            } => write!(f, "{}s to resolution, need {}s", remaining_secs, min_secs),
            GateRejection::OutsideEligibility => {
                write!(f, "outside directional trading hours")
            }
            GateRejection::CatalystRequired => write!(f, "no catalyst active"),
            GateRejection::DirectionConflict => {
                write!(f, "fired signals disagree on direction")
            }
            GateRejection::NoDirection => write!(f, "no directional signal fired"),
            GateRejection::CreditShortfall { have, need } => {
                write!(f, "credits {} < {}", have, need)
            }
            GateRejection::EdgeBelowMinimum { edge, min } => {
                write!(f, "edge {} < min {}", edge, min)
            }
            GateRejection::LossStreakBar {
                streak,
                edge,
                required,
            } => write!(
                f,
                "loss streak {}: edge {} below raised bar {}",
                streak, edge, required
            ),
            GateRejection::StakeBelowMinimum { stake, min } => {
                write!(f, "stake ${} < min ${}", stake, min)
            }
            GateRejection::PortfolioRiskExceeded {
                exposure,
                stake,
                cap,
            } => write!(f, "exposure ${} + ${} > cap ${}", exposure, stake, cap),
            GateRejection::HourlyTradeCapReached { count, cap } => {
                write!(f, "{} trades in the last hour (cap {})", count, cap)
            }
            GateRejection::SessionLossLimit { loss, cap } => {
                write!(f, "session loss ${} at limit ${}", loss, cap)
            }
        }
    }
}

/// Aggregate verdict for one market at one instant. Immutable once
/// produced; consumed once by the order-placement path.
#[derive(Debug, Clone)]
pub struct EdgeVerdict {
    pub asset: Option<CryptoAsset>,
    pub strategy: StrategyKind,
    pub readings: Vec<SignalReading>,
    pub total_credits: u32,
    pub direction: Option<Outcome>,
    pub implied_prob: Decimal,
    pub estimated_prob: Decimal,
    pub edge: Decimal,
    pub stake: Decimal,
    /// YES mid at evaluation time.
    pub entry_price: Decimal,
    pub pass: bool,
    pub rejections: Vec<GateRejection>,
}

impl EdgeVerdict {
    fn rejected(
        asset: Option<CryptoAsset>,
        strategy: StrategyKind,
        rejections: Vec<GateRejection>,
    ) -> Self {
        Self {
            asset,
            strategy,
            readings: Vec::new(),
            total_credits: 0,
            direction: None,
            implied_prob: Decimal::ZERO,
            estimated_prob: Decimal::ZERO,
            edge: Decimal::ZERO,
            stake: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            pass: false,
            rejections,
        }
    }

    /// Fired readings only.
    pub fn fired(&self) -> impl Iterator<Item = &SignalReading> {
        self.readings.iter().filter(|r| r.outcome.is_fired())
    }

    /// The strategy name persisted with a position opened off this
    /// verdict.
    pub fn strategy_label(&self) -> String {
        self.strategy.as_str().to_string()
    }

    fn summary(&self) -> String {
        self.readings
            .iter()
            .map(|r| {
                let mark = match &r.outcome {
                    SignalOutcome::Fired { .. } => "PASS",
                    SignalOutcome::Quiet => "fail",
                    SignalOutcome::Suppressed { .. } => "KILL",
                };
                format!("{}:{}", r.name, mark)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The trade gate evaluator.
#[derive(Debug, Clone)]
pub struct EdgeEvaluator {
    signals: SignalConfig,
    trading: TradingConfig,
    risk: RiskLimits,
    strategies: StrategyConfig,
    bankroll: Decimal,
}

impl EdgeEvaluator {
    pub fn new(
        signals: SignalConfig,
        trading: TradingConfig,
        risk: RiskLimits,
        strategies: StrategyConfig,
        bankroll: Decimal,
    ) -> Self {
        Self {
            signals,
            trading,
            risk,
            strategies,
            bankroll,
        }
    }

    /// Evaluate one market against its routed profile.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        market: &Market,
        asset: Option<CryptoAsset>,
        profile: &AssetProfile,
        telemetry: &TelemetrySnapshot,
        anchor_telemetry: &TelemetrySnapshot,
        broadcast: &BroadcastState,
        catalyst: &CatalystStore,
        risk: &RiskSnapshot,
        now: DateTime<Utc>,
    ) -> EdgeVerdict {
        let label = asset.map(|a| a.as_str()).unwrap_or("?");

        // Hard prerequisites: book, mid, time to resolution.
        let Some(mid) = market.mid_price() else {
            info!(asset = label, market = %market.market_id, "gate: no usable book - skip");
            return EdgeVerdict::rejected(asset, profile.strategy, vec![GateRejection::NoMarketData]);
        };
        let remaining = market.seconds_remaining(now);
        if remaining < self.trading.min_time_remaining_secs {
            return EdgeVerdict::rejected(
                asset,
                profile.strategy,
                vec![GateRejection::InsufficientTime {
                    remaining_secs: remaining,
                    min_secs: self.trading.min_time_remaining_secs,
                }],
            );
        }
        if let Some(window) = profile.eligibility {
            if !window.contains(now) {
                info!(asset = label, "gate: outside eligibility window - skip");
                return EdgeVerdict::rejected(
                    asset,
                    profile.strategy,
                    vec![GateRejection::OutsideEligibility],
                );
            }
        }

        // Strategy-specific signal.
        let strategy_reading = self.strategy_reading(
            market,
            profile,
            telemetry,
            anchor_telemetry,
            broadcast,
            catalyst,
            mid,
            now,
        );

        if profile.catalyst_required
            && !strategy_reading
                .as_ref()
                .is_some_and(|r| r.outcome.is_fired())
        {
            info!(asset = label, "gate: catalyst required, none active - skip");
            return EdgeVerdict::rejected(
                asset,
                profile.strategy,
                vec![GateRejection::CatalystRequired],
            );
        }

        // Base signals over the market snapshot.
        let empty = Vec::new();
        let history = market
            .book
            .as_ref()
            .map(|_| &market.price_history)
            .unwrap_or(&empty);
        let ob_outcome = market
            .book
            .as_ref()
            .map(|b| signals::book_imbalance(b, market.no_book.as_ref(), &self.signals))
            .unwrap_or(SignalOutcome::Quiet);
        let momentum_outcome = signals::momentum(history, &self.signals);
        let (volume_outcome, _volume_ratio) = signals::volume_spike(history, &self.signals);

        let mut readings = vec![
            SignalReading::new(SignalName::BookImbalance, ob_outcome),
            SignalReading::new(SignalName::Momentum, momentum_outcome),
            SignalReading::new(SignalName::VolumeSpike, volume_outcome),
        ];
        if let Some(reading) = strategy_reading {
            readings.push(reading);
        }

        // Consensus: all fired directions must agree.
        let directions: Vec<Outcome> = readings
            .iter()
            .filter_map(|r| r.outcome.direction())
            .collect();
        let conflict = directions
            .windows(2)
            .any(|pair| pair[0] != pair[1]);
        let direction = if conflict {
            None
        } else {
            directions.first().copied()
        };

        // Single highest applicable boost - never summed.
        let boost = self.select_boost(&readings, profile, telemetry, direction);

        // Probability edge and fractional-Kelly stake.
        let (implied, estimated, edge, raw_stake) = match direction {
            Some(dir) => self.kelly(mid, dir, boost),
            None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        };

        // The value signal fires when the edge clears the minimum.
        let value_outcome = match direction {
            Some(dir) if edge >= self.signals.min_edge => SignalOutcome::fired(Some(dir)),
            _ => SignalOutcome::Quiet,
        };
        readings.push(SignalReading::new(SignalName::Value, value_outcome));

        // Clamp stake to the per-trade risk budget and hard caps.
        let stake = self.clamp_stake(raw_stake);

        // Credit aggregation per the configured stacking policy.
        let total_credits = self.total_credits(&readings, profile);

        // Gate checks, in rejection-priority order.
        let mut rejections = Vec::new();
        if conflict {
            rejections.push(GateRejection::DirectionConflict);
        } else if direction.is_none() {
            rejections.push(GateRejection::NoDirection);
        }
        if total_credits < profile.min_credits {
            rejections.push(GateRejection::CreditShortfall {
                have: total_credits,
                need: profile.min_credits,
            });
        }
        if direction.is_some() && edge < self.signals.min_edge {
            rejections.push(GateRejection::EdgeBelowMinimum {
                edge,
                min: self.signals.min_edge,
            });
        }
        if direction.is_some() && risk.consecutive_losses >= self.risk.loss_streak_threshold {
            let required = self.signals.min_edge + self.risk.loss_streak_extra_edge;
            if edge < required {
                rejections.push(GateRejection::LossStreakBar {
                    streak: risk.consecutive_losses,
                    edge,
                    required,
                });
            }
        }
        if direction.is_some() && stake < self.trading.min_stake {
            rejections.push(GateRejection::StakeBelowMinimum {
                stake,
                min: self.trading.min_stake,
            });
        }
        let portfolio_cap = self.bankroll * self.risk.max_portfolio_risk;
        if risk.open_exposure + stake > portfolio_cap {
            rejections.push(GateRejection::PortfolioRiskExceeded {
                exposure: risk.open_exposure,
                stake,
                cap: portfolio_cap,
            });
        }
        if risk.trades_last_hour >= self.risk.max_trades_per_hour {
            rejections.push(GateRejection::HourlyTradeCapReached {
                count: risk.trades_last_hour,
                cap: self.risk.max_trades_per_hour,
            });
        }
        let session_loss_cap = self.bankroll * self.risk.session_loss_limit;
        if risk.realized_pnl <= -session_loss_cap {
            rejections.push(GateRejection::SessionLossLimit {
                loss: risk.realized_pnl.abs(),
                cap: session_loss_cap,
            });
        }

        let pass = rejections.is_empty();
        let verdict = EdgeVerdict {
            asset,
            strategy: profile.strategy,
            readings,
            total_credits,
            direction,
            implied_prob: implied,
            estimated_prob: estimated,
            edge,
            stake,
            entry_price: mid,
            pass,
            rejections,
        };

        info!(
            asset = label,
            market = %market.market_id,
            signals = %verdict.summary(),
            credits = verdict.total_credits,
            need = profile.min_credits,
            direction = ?verdict.direction,
            edge = %verdict.edge,
            stake = %verdict.stake,
            "signal summary"
        );
        if verdict.pass {
            info!(
                asset = label,
                market = %market.market_id,
                strategy = %verdict.strategy,
                "gate decision: TRADE"
            );
        } else {
            let reasons: Vec<String> = verdict
                .rejections
                .iter()
                .map(|r| format!("{}: {}", r.code(), r))
                .collect();
            info!(
                asset = label,
                market = %market.market_id,
                reasons = %reasons.join("; "),
                "gate decision: no trade"
            );
        }
        verdict
    }

    #[allow(clippy::too_many_arguments)]
    fn strategy_reading(
        &self,
        market: &Market,
        profile: &AssetProfile,
        telemetry: &TelemetrySnapshot,
        anchor_telemetry: &TelemetrySnapshot,
        broadcast: &BroadcastState,
        catalyst: &CatalystStore,
        mid: Decimal,
        now: DateTime<Utc>,
    ) -> Option<SignalReading> {
        let name = profile.strategy.signal()?;
        let outcome = match profile.strategy {
            StrategyKind::MomentumCarry => {
                specials::momentum_carry(telemetry, &self.strategies.carry)
            }
            StrategyKind::LagFollow => specials::lag_follow(
                broadcast,
                mid,
                self.strategies.lag.max_repricing,
                now,
            ),
            StrategyKind::SqueezeReversal => {
                // Supportive anchor: neutral-or-up on the window.
                let anchor_supportive = anchor_telemetry
                    .pct_move_from_open()
                    .map(|pct| pct >= dec!(-0.002))
                    .unwrap_or(true);
                specials::squeeze_reversal(
                    market,
                    telemetry,
                    anchor_supportive,
                    &self.strategies.squeeze,
                    now,
                )
            }
            StrategyKind::CatalystDriven => {
                let asset = CryptoAsset::from_description(&market.question)?;
                specials::catalyst(catalyst, asset, now)
            }
            StrategyKind::Baseline => return None,
        };
        Some(SignalReading::new(name, outcome))
    }

    /// Pick the single highest applicable boost: a fired strategy
    /// signal's configured boost, a funding-alignment bump, or the base
    /// boost - whichever is largest, never their sum.
    fn select_boost(
        &self,
        readings: &[SignalReading],
        profile: &AssetProfile,
        telemetry: &TelemetrySnapshot,
        direction: Option<Outcome>,
    ) -> Decimal {
        let mut best = self.signals.base_boost;

        let strategy_fired = readings.iter().any(|r| {
            matches!(
                r.name,
                SignalName::MomentumCarry
                    | SignalName::LagFollow
                    | SignalName::SqueezeReversal
                    | SignalName::Catalyst
            ) && r.outcome.is_fired()
        });
        if strategy_fired {
            best = best.max(profile.strategy_boost);
        }

        // Negative funding with a YES consensus: shorts paying to stay
        // short, squeeze pressure aligns with the trade.
        if direction == Some(Outcome::Yes) {
            if let Some(funding) = telemetry.funding_rate {
                if funding < self.signals.funding_alignment_threshold {
                    best = best.max(self.signals.base_boost + self.signals.funding_alignment_boost);
                }
            }
        }

        best
    }

    /// Kelly sizing on a binary payout.
    ///
    /// At price X the net odds are b = (1 - X) / X, and the full-Kelly
    /// fraction is f* = (p(b + 1) - 1) / b. The recommendation applies
    /// the configured Kelly fraction to f*.
    ///
    /// Returns (implied_prob, estimated_prob, edge, stake).
    fn kelly(
        &self,
        yes_mid: Decimal,
        direction: Outcome,
        boost: Decimal,
    ) -> (Decimal, Decimal, Decimal, Decimal) {
        if yes_mid <= Decimal::ZERO || yes_mid >= Decimal::ONE {
            return (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        }
        let price = match direction {
            Outcome::Yes => yes_mid,
            Outcome::No => Decimal::ONE - yes_mid,
        };
        let implied = price;
        let estimated = (implied + boost).min(MAX_ESTIMATED_PROB);
        let edge = estimated - implied;

        let b = (Decimal::ONE - price) / price;
        if b.is_zero() {
            return (implied, estimated, edge, Decimal::ZERO);
        }
        let full_kelly = (estimated * (b + Decimal::ONE) - Decimal::ONE) / b;
        if full_kelly <= Decimal::ZERO {
            return (implied, estimated, edge, Decimal::ZERO);
        }
        let stake = full_kelly * self.trading.kelly_fraction * self.bankroll;
        (implied, estimated, edge, stake)
    }

    /// Bound the stake by the bankroll fraction cap, the absolute cap,
    /// and the per-trade risk budget.
    fn clamp_stake(&self, raw: Decimal) -> Decimal {
        if raw <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        raw.min(self.bankroll * self.trading.max_bankroll_fraction)
            .min(self.trading.max_stake)
            .min(self.bankroll * self.risk.per_trade_risk)
            .round_dp(2)
    }

    fn total_credits(&self, readings: &[SignalReading], profile: &AssetProfile) -> u32 {
        match self.trading.credit_stacking {
            CreditStacking::Additive => readings
                .iter()
                .filter(|r| r.outcome.is_fired())
                .map(|r| profile.weights.weight_for(r.name))
                .sum(),
            CreditStacking::Best => {
                let value: u32 = readings
                    .iter()
                    .filter(|r| r.outcome.is_fired() && r.name == SignalName::Value)
                    .map(|r| profile.weights.weight_for(r.name))
                    .sum();
                let best = readings
                    .iter()
                    .filter(|r| r.outcome.is_fired() && r.name != SignalName::Value)
                    .map(|r| profile.weights.weight_for(r.name))
                    .max()
                    .unwrap_or(0);
                value + best
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::router::StrategyRouter;
    use crate::types::{OrderBook, PriceLevel, PriceTick};
    use chrono::Duration;

    fn evaluator(bankroll: Decimal) -> EdgeEvaluator {
        EdgeEvaluator::new(
            SignalConfig::default(),
            TradingConfig::default(),
            RiskLimits::default(),
            StrategyConfig::default(),
            bankroll,
        )
    }

    fn trending_market(question: &str, mid: Decimal) -> Market {
        let now = Utc::now();
        let half_spread = dec!(0.01);
        // Heavy bids so the imbalance signal fires YES, plus an upward
        // tick history so momentum agrees.
        let book = OrderBook {
            bids: vec![PriceLevel::new(mid - half_spread, dec!(3000))],
            asks: vec![PriceLevel::new(mid + half_spread, dec!(500))],
            timestamp: Some(now),
        };
        let prices = [
            mid - dec!(0.03),
            mid - dec!(0.024),
            mid - dec!(0.018),
            mid - dec!(0.012),
            mid - dec!(0.006),
            mid,
        ];
        Market {
            market_id: "m-trend".into(),
            question: question.into(),
            yes_token_id: "y".into(),
            no_token_id: "n".into(),
            deadline: now + Duration::minutes(10),
            book: Some(book),
            no_book: None,
            price_history: prices
                .iter()
                .map(|p| PriceTick {
                    price: *p,
                    volume: dec!(10),
                    timestamp: now,
                })
                .collect(),
        }
    }

    fn eval_simple(market: &Market, risk: &RiskSnapshot) -> EdgeVerdict {
        let evaluator = evaluator(dec!(1000));
        let router = StrategyRouter::new(&StrategyConfig::default(), dec!(0.08));
        let routed = router.route(market);
        evaluator.evaluate(
            market,
            routed.asset,
            &routed.profile,
            &TelemetrySnapshot::default(),
            &TelemetrySnapshot::default(),
            &BroadcastState::new(),
            &CatalystStore::new(),
            risk,
            Utc::now(),
        )
    }

    #[test]
    fn test_pass_implies_credits_consensus_and_edge() {
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let verdict = eval_simple(&market, &RiskSnapshot::default());

        assert!(verdict.pass, "rejections: {:?}", verdict.rejections);
        assert!(verdict.total_credits >= 2);
        assert_eq!(verdict.direction, Some(Outcome::Yes));
        assert!(verdict.edge >= dec!(0.03));
        // All fired directional signals agree.
        let dirs: Vec<_> = verdict
            .readings
            .iter()
            .filter_map(|r| r.outcome.direction())
            .collect();
        assert!(dirs.iter().all(|d| *d == Outcome::Yes));
    }

    #[test]
    fn test_no_book_fails_fast() {
        let mut market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        market.book = None;
        let verdict = eval_simple(&market, &RiskSnapshot::default());
        assert!(!verdict.pass);
        assert_eq!(verdict.rejections, vec![GateRejection::NoMarketData]);
    }

    #[test]
    fn test_insufficient_time_rejected() {
        let mut market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        market.deadline = Utc::now() + Duration::seconds(30);
        let verdict = eval_simple(&market, &RiskSnapshot::default());
        assert!(!verdict.pass);
        assert!(matches!(
            verdict.rejections[0],
            GateRejection::InsufficientTime { .. }
        ));
    }

    #[test]
    fn test_direction_conflict_fails() {
        // Heavy asks (imbalance -> NO) but rising prices (momentum -> YES).
        let now = Utc::now();
        let book = OrderBook {
            bids: vec![PriceLevel::new(dec!(0.49), dec!(200))],
            asks: vec![PriceLevel::new(dec!(0.51), dec!(5000))],
            timestamp: Some(now),
        };
        let prices = [
            dec!(0.46),
            dec!(0.47),
            dec!(0.48),
            dec!(0.49),
            dec!(0.50),
            dec!(0.51),
        ];
        let market = Market {
            market_id: "m-conflict".into(),
            question: "Bitcoin Up or Down?".into(),
            yes_token_id: "y".into(),
            no_token_id: "n".into(),
            deadline: now + Duration::minutes(10),
            book: Some(book),
            no_book: None,
            price_history: prices
                .iter()
                .map(|p| PriceTick {
                    price: *p,
                    volume: dec!(10),
                    timestamp: now,
                })
                .collect(),
        };
        let verdict = eval_simple(&market, &RiskSnapshot::default());
        assert!(!verdict.pass);
        assert!(verdict
            .rejections
            .contains(&GateRejection::DirectionConflict));
        assert_eq!(verdict.direction, None);
    }

    #[test]
    fn test_hourly_cap_blocks() {
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let risk = RiskSnapshot {
            trades_last_hour: 20,
            ..Default::default()
        };
        let verdict = eval_simple(&market, &risk);
        assert!(!verdict.pass);
        assert!(verdict
            .rejections
            .iter()
            .any(|r| matches!(r, GateRejection::HourlyTradeCapReached { .. })));
    }

    #[test]
    fn test_portfolio_cap_blocks() {
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let risk = RiskSnapshot {
            open_exposure: dec!(495),
            ..Default::default()
        };
        // Cap is 50% of $1000; any meaningful stake breaches it.
        let verdict = eval_simple(&market, &risk);
        assert!(!verdict.pass);
        assert!(verdict
            .rejections
            .iter()
            .any(|r| matches!(r, GateRejection::PortfolioRiskExceeded { .. })));
    }

    #[test]
    fn test_loss_streak_raises_bar() {
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let risk = RiskSnapshot {
            consecutive_losses: 3,
            ..Default::default()
        };
        let verdict = eval_simple(&market, &risk);
        // Base boost gives 0.08 edge; raised bar is 0.03 + 0.02 = 0.05,
        // so the streak alone does not block a strong setup.
        assert!(verdict.pass);

        // With a weaker boost the same streak blocks.
        let mut signals = SignalConfig::default();
        signals.base_boost = dec!(0.04);
        let evaluator = EdgeEvaluator::new(
            signals,
            TradingConfig::default(),
            RiskLimits::default(),
            StrategyConfig::default(),
            dec!(1000),
        );
        let router = StrategyRouter::new(&StrategyConfig::default(), dec!(0.04));
        let routed = router.route(&market);
        let verdict = evaluator.evaluate(
            &market,
            routed.asset,
            &routed.profile,
            &TelemetrySnapshot::default(),
            &TelemetrySnapshot::default(),
            &BroadcastState::new(),
            &CatalystStore::new(),
            &risk,
            Utc::now(),
        );
        assert!(!verdict.pass);
        assert!(verdict
            .rejections
            .iter()
            .any(|r| matches!(r, GateRejection::LossStreakBar { .. })));
    }

    #[test]
    fn test_session_loss_limit_blocks() {
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let risk = RiskSnapshot {
            realized_pnl: dec!(-200),
            ..Default::default()
        };
        let verdict = eval_simple(&market, &risk);
        assert!(!verdict.pass);
        assert!(verdict
            .rejections
            .iter()
            .any(|r| matches!(r, GateRejection::SessionLossLimit { .. })));
    }

    #[test]
    fn test_stake_clamped_to_caps() {
        // Large bankroll: the absolute max-stake cap binds.
        let market = trending_market("Bitcoin Up or Down?", dec!(0.50));
        let evaluator = evaluator(dec!(100000));
        let router = StrategyRouter::new(&StrategyConfig::default(), dec!(0.08));
        let routed = router.route(&market);
        let verdict = evaluator.evaluate(
            &market,
            routed.asset,
            &routed.profile,
            &TelemetrySnapshot::default(),
            &TelemetrySnapshot::default(),
            &BroadcastState::new(),
            &CatalystStore::new(),
            &RiskSnapshot::default(),
            Utc::now(),
        );
        assert!(verdict.stake <= dec!(100));
    }

    #[test]
    fn test_kelly_round_numbers() {
        let evaluator = evaluator(dec!(1000));
        // Mid 0.50, YES, boost 0.08: p=0.58, b=1, f*=0.16,
        // quarter-Kelly stake = 0.16 * 0.25 * 1000 = 40.
        let (implied, estimated, edge, stake) =
            evaluator.kelly(dec!(0.50), Outcome::Yes, dec!(0.08));
        assert_eq!(implied, dec!(0.50));
        assert_eq!(estimated, dec!(0.58));
        assert_eq!(edge, dec!(0.08));
        assert_eq!(stake.round_dp(2), dec!(40.00));
    }

    #[test]
    fn test_kelly_no_side_uses_complement() {
        let evaluator = evaluator(dec!(1000));
        let (implied, ..) = evaluator.kelly(dec!(0.30), Outcome::No, dec!(0.08));
        assert_eq!(implied, dec!(0.70));
    }

    #[test]
    fn test_credit_stacking_policies() {
        let evaluator_add = evaluator(dec!(1000));
        let mut trading_best = TradingConfig::default();
        trading_best.credit_stacking = CreditStacking::Best;
        let evaluator_best = EdgeEvaluator::new(
            SignalConfig::default(),
            trading_best,
            RiskLimits::default(),
            StrategyConfig::default(),
            dec!(1000),
        );

        let readings = vec![
            SignalReading::new(
                SignalName::BookImbalance,
                SignalOutcome::fired(Some(Outcome::Yes)),
            ),
            SignalReading::new(
                SignalName::LagFollow,
                SignalOutcome::fired(Some(Outcome::Yes)),
            ),
            SignalReading::new(
                SignalName::Value,
                SignalOutcome::fired(Some(Outcome::Yes)),
            ),
            SignalReading::new(SignalName::Momentum, SignalOutcome::Quiet),
        ];
        let profile = AssetProfile {
            strategy: StrategyKind::LagFollow,
            weights: crate::strategy::router::SignalWeights::uniform(2),
            min_credits: 3,
            strategy_boost: dec!(0.12),
            eligibility: None,
            catalyst_required: false,
        };

        // Additive: 1 (book) + 2 (lag) + 1 (value) = 4.
        assert_eq!(evaluator_add.total_credits(&readings, &profile), 4);
        // Best: value (1) + best other (lag, 2) = 3.
        assert_eq!(evaluator_best.total_credits(&readings, &profile), 3);
    }

    #[test]
    fn test_boost_selection_takes_highest_not_sum() {
        let evaluator = evaluator(dec!(1000));
        let profile = AssetProfile {
            strategy: StrategyKind::SqueezeReversal,
            weights: crate::strategy::router::SignalWeights::uniform(1),
            min_credits: 2,
            strategy_boost: dec!(0.15),
            eligibility: None,
            catalyst_required: false,
        };
        let readings = vec![SignalReading::new(
            SignalName::SqueezeReversal,
            SignalOutcome::fired(Some(Outcome::Yes)),
        )];
        // Funding alignment would add 0.02 to the 0.08 base (=0.10),
        // but the fired squeeze boost 0.15 is higher - and they never sum.
        let telemetry = TelemetrySnapshot {
            spot: None,
            window_open_price: None,
            funding_rate: Some(dec!(-0.002)),
            recent_prices: vec![],
        };
        let boost = evaluator.select_boost(&readings, &profile, &telemetry, Some(Outcome::Yes));
        assert_eq!(boost, dec!(0.15));
    }

    #[test]
    fn test_funding_alignment_boost_applies_without_strategy() {
        let evaluator = evaluator(dec!(1000));
        let profile = StrategyRouter::default_profile();
        let telemetry = TelemetrySnapshot {
            spot: None,
            window_open_price: None,
            funding_rate: Some(dec!(-0.002)),
            recent_prices: vec![],
        };
        let boost = evaluator.select_boost(&[], &profile, &telemetry, Some(Outcome::Yes));
        assert_eq!(boost, dec!(0.10));
        // NO consensus: alignment does not apply.
        let boost = evaluator.select_boost(&[], &profile, &telemetry, Some(Outcome::No));
        assert_eq!(boost, dec!(0.08));
    }
}
