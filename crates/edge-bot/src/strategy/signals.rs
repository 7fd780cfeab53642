//! Base market signals.
//!
//! Every signal is a pure function over the snapshot it is given; none
//! of them mutate telemetry or market state. A signal resolves to one
//! of three outcomes:
//!
//! - `Fired` - the condition holds, optionally with a direction
//! - `Quiet` - the condition does not hold
//! - `Suppressed` - a kill switch disqualified the signal; logged
//!   distinctly from an ordinary non-fire

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use edge_common::Outcome;

use crate::config::SignalConfig;
use crate::types::{OrderBook, PriceTick};

/// Identity of a signal, used for weights and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalName {
    BookImbalance,
    Momentum,
    VolumeSpike,
    Value,
    MomentumCarry,
    LagFollow,
    SqueezeReversal,
    Catalyst,
}

impl SignalName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::BookImbalance => "OB_IMBALANCE",
            SignalName::Momentum => "MOMENTUM",
            SignalName::VolumeSpike => "VOLUME_SPIKE",
            SignalName::Value => "VALUE",
            SignalName::MomentumCarry => "MOMENTUM_CARRY",
            SignalName::LagFollow => "LAG_FOLLOW",
            SignalName::SqueezeReversal => "SQUEEZE",
            SignalName::Catalyst => "CATALYST",
        }
    }
}

impl std::fmt::Display for SignalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolution of one signal over one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalOutcome {
    /// Condition holds. Direction is `None` for non-directional signals
    /// (volume spike).
    Fired { direction: Option<Outcome> },
    /// Condition does not hold.
    Quiet,
    /// A kill switch forced this signal off; must be logged distinctly
    /// from `Quiet`.
    Suppressed { reason: String },
}

impl SignalOutcome {
    pub fn fired(direction: Option<Outcome>) -> Self {
        SignalOutcome::Fired { direction }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, SignalOutcome::Fired { .. })
    }

    pub fn direction(&self) -> Option<Outcome> {
        match self {
            SignalOutcome::Fired { direction } => *direction,
            _ => None,
        }
    }
}

/// A named signal outcome, as carried in a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalReading {
    pub name: SignalName,
    pub outcome: SignalOutcome,
}

impl SignalReading {
    pub fn new(name: SignalName, outcome: SignalOutcome) -> Self {
        Self { name, outcome }
    }
}

/// Order book imbalance: heavy depth on one side predicts a move.
///
/// Bids dominating -> YES; asks dominating -> NO. When the NO-token book
/// is available it must not contradict the YES-book read. A balanced
/// book with an extreme mid falls back to fading the extreme.
pub fn book_imbalance(
    book: &OrderBook,
    no_book: Option<&OrderBook>,
    config: &SignalConfig,
) -> SignalOutcome {
    let bid_depth = book.bid_depth(config.ob_depth_levels);
    let ask_depth = book.ask_depth(config.ob_depth_levels);
    let total = bid_depth + ask_depth;
    if total.is_zero() {
        return SignalOutcome::Quiet;
    }

    let bid_ratio = bid_depth / total;
    let ask_ratio = ask_depth / total;

    let mut direction = if bid_ratio >= config.ob_imbalance_threshold {
        Some(Outcome::Yes)
    } else if ask_ratio >= config.ob_imbalance_threshold {
        Some(Outcome::No)
    } else {
        None
    };

    // Cross-check against the NO book: heavy NO bids are bearish for YES.
    if let (Some(dir), Some(no_ob)) = (direction, no_book) {
        let no_bid = no_ob.bid_depth(config.ob_depth_levels);
        let no_ask = no_ob.ask_depth(config.ob_depth_levels);
        let no_total = no_bid + no_ask;
        if no_total > Decimal::ZERO {
            let no_side = if no_bid / no_total >= config.ob_imbalance_threshold {
                Some(Outcome::No)
            } else if no_ask / no_total >= config.ob_imbalance_threshold {
                Some(Outcome::Yes)
            } else {
                None
            };
            if let Some(no_dir) = no_side {
                if no_dir != dir {
                    info!("book imbalance: YES and NO books disagree - not firing");
                    direction = None;
                }
            }
        }
    }

    if let Some(dir) = direction {
        return SignalOutcome::fired(Some(dir));
    }

    // Balanced book, extreme mid: fade the extreme.
    if let Some(mid) = book.mid_price() {
        if mid < config.ob_extreme_low {
            return SignalOutcome::fired(Some(Outcome::Yes));
        }
        if mid > config.ob_extreme_high {
            return SignalOutcome::fired(Some(Outcome::No));
        }
    }

    SignalOutcome::Quiet
}

/// Momentum: the last `momentum_window` ticks moved at least
/// `momentum_min_move` with sufficient directional consistency.
pub fn momentum(history: &[PriceTick], config: &SignalConfig) -> SignalOutcome {
    if history.len() < config.momentum_window + 1 {
        return SignalOutcome::Quiet;
    }

    let window = &history[history.len() - config.momentum_window..];
    let start = window[0].price;
    let end = window[window.len() - 1].price;
    if start <= Decimal::ZERO {
        return SignalOutcome::Quiet;
    }
    let total_move = (end - start) / start;

    let mut up = 0u32;
    let mut down = 0u32;
    for pair in window.windows(2) {
        let delta = pair[1].price - pair[0].price;
        if delta > Decimal::ZERO {
            up += 1;
        } else if delta < Decimal::ZERO {
            down += 1;
        }
    }
    let steps = (window.len() - 1) as u32;
    if steps == 0 {
        return SignalOutcome::Quiet;
    }
    let consistency = Decimal::from(up.max(down)) / Decimal::from(steps);

    if total_move.abs() >= config.momentum_min_move && consistency >= config.momentum_consistency {
        let direction = if total_move > Decimal::ZERO {
            Outcome::Yes
        } else {
            Outcome::No
        };
        return SignalOutcome::fired(Some(direction));
    }
    SignalOutcome::Quiet
}

/// Volume spike: the latest tick's volume against a rolling baseline.
/// Returns the ratio alongside the outcome for logging.
pub fn volume_spike(history: &[PriceTick], config: &SignalConfig) -> (SignalOutcome, Decimal) {
    if history.len() < config.volume_window + 1 {
        return (SignalOutcome::Quiet, Decimal::ZERO);
    }

    let recent = history[history.len() - 1].volume;
    let baseline = &history[history.len() - 1 - config.volume_window..history.len() - 1];
    let total: Decimal = baseline.iter().map(|t| t.volume).sum();
    if total.is_zero() {
        return (SignalOutcome::Quiet, Decimal::ZERO);
    }
    let avg = total / Decimal::from(baseline.len() as u32);
    if avg.is_zero() {
        return (SignalOutcome::Quiet, Decimal::ZERO);
    }

    let ratio = recent / avg;
    if ratio >= config.volume_spike_multiplier {
        (SignalOutcome::fired(None), ratio)
    } else {
        (SignalOutcome::Quiet, ratio)
    }
}

/// Wilder's RSI over a price series. Returns 50 when there is not
/// enough history to compute it.
pub fn wilder_rsi(prices: &[Decimal], period: usize) -> Decimal {
    if prices.len() < period + 1 {
        return dec!(50);
    }
    let deltas: Vec<Decimal> = prices.windows(2).map(|p| p[1] - p[0]).collect();
    let tail = &deltas[deltas.len() - period..];

    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for d in tail {
        if *d > Decimal::ZERO {
            gains += *d;
        } else {
            losses += -*d;
        }
    }
    let avg_gain = gains / Decimal::from(period as u32);
    let avg_loss = losses / Decimal::from(period as u32);
    if avg_loss.is_zero() {
        return dec!(100);
    }
    let rs = avg_gain / avg_loss;
    dec!(100) - (dec!(100) / (Decimal::ONE + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceLevel;
    use chrono::Utc;

    fn config() -> SignalConfig {
        SignalConfig::default()
    }

    fn book(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderBook {
        OrderBook {
            bids: bids
                .into_iter()
                .map(|(p, s)| PriceLevel::new(p, s))
                .collect(),
            asks: asks
                .into_iter()
                .map(|(p, s)| PriceLevel::new(p, s))
                .collect(),
            timestamp: None,
        }
    }

    fn ticks(prices: &[Decimal]) -> Vec<PriceTick> {
        prices
            .iter()
            .map(|p| PriceTick {
                price: *p,
                volume: dec!(10),
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_imbalance_bids_dominate() {
        let b = book(
            vec![(dec!(0.50), dec!(1000))],
            vec![(dec!(0.52), dec!(100))],
        );
        assert_eq!(
            book_imbalance(&b, None, &config()),
            SignalOutcome::fired(Some(Outcome::Yes))
        );
    }

    #[test]
    fn test_imbalance_asks_dominate() {
        let b = book(
            vec![(dec!(0.48), dec!(100))],
            vec![(dec!(0.50), dec!(1000))],
        );
        assert_eq!(
            book_imbalance(&b, None, &config()),
            SignalOutcome::fired(Some(Outcome::No))
        );
    }

    #[test]
    fn test_imbalance_balanced_is_quiet() {
        let b = book(
            vec![(dec!(0.49), dec!(500))],
            vec![(dec!(0.51), dec!(500))],
        );
        assert_eq!(book_imbalance(&b, None, &config()), SignalOutcome::Quiet);
    }

    #[test]
    fn test_imbalance_no_book_disagreement_blocks() {
        let yes_book = book(
            vec![(dec!(0.50), dec!(1000))],
            vec![(dec!(0.52), dec!(100))],
        );
        // Heavy NO bids imply NO - contradicting the YES-book read.
        let no_book = book(
            vec![(dec!(0.50), dec!(1000))],
            vec![(dec!(0.52), dec!(100))],
        );
        assert_eq!(
            book_imbalance(&yes_book, Some(&no_book), &config()),
            SignalOutcome::Quiet
        );
    }

    #[test]
    fn test_imbalance_mid_extreme_fallback() {
        let b = book(
            vec![(dec!(0.30), dec!(500))],
            vec![(dec!(0.34), dec!(500))],
        );
        // Balanced depth, mid 0.32 < 0.42 -> YES.
        assert_eq!(
            book_imbalance(&b, None, &config()),
            SignalOutcome::fired(Some(Outcome::Yes))
        );
    }

    #[test]
    fn test_momentum_fires_up() {
        let history = ticks(&[
            dec!(0.50),
            dec!(0.505),
            dec!(0.51),
            dec!(0.515),
            dec!(0.52),
            dec!(0.53),
        ]);
        assert_eq!(
            momentum(&history, &config()),
            SignalOutcome::fired(Some(Outcome::Yes))
        );
    }

    #[test]
    fn test_momentum_fires_down() {
        let history = ticks(&[
            dec!(0.53),
            dec!(0.525),
            dec!(0.52),
            dec!(0.515),
            dec!(0.51),
            dec!(0.50),
        ]);
        assert_eq!(
            momentum(&history, &config()),
            SignalOutcome::fired(Some(Outcome::No))
        );
    }

    #[test]
    fn test_momentum_choppy_is_quiet() {
        let history = ticks(&[
            dec!(0.50),
            dec!(0.52),
            dec!(0.49),
            dec!(0.52),
            dec!(0.49),
            dec!(0.515),
        ]);
        assert_eq!(momentum(&history, &config()), SignalOutcome::Quiet);
    }

    #[test]
    fn test_momentum_insufficient_history() {
        let history = ticks(&[dec!(0.50), dec!(0.52)]);
        assert_eq!(momentum(&history, &config()), SignalOutcome::Quiet);
    }

    #[test]
    fn test_volume_spike_fires() {
        let mut history = ticks(&[dec!(0.5); 11]);
        for t in history.iter_mut() {
            t.volume = dec!(10);
        }
        history.last_mut().unwrap().volume = dec!(30);
        let (outcome, ratio) = volume_spike(&history, &config());
        assert!(outcome.is_fired());
        assert_eq!(ratio, dec!(3));
    }

    #[test]
    fn test_volume_spike_flat_is_quiet() {
        let history = ticks(&[dec!(0.5); 12]);
        let (outcome, ratio) = volume_spike(&history, &config());
        assert_eq!(outcome, SignalOutcome::Quiet);
        assert_eq!(ratio, dec!(1));
    }

    #[test]
    fn test_volume_spike_zero_baseline() {
        let mut history = ticks(&[dec!(0.5); 12]);
        for t in history.iter_mut() {
            t.volume = Decimal::ZERO;
        }
        let (outcome, _) = volume_spike(&history, &config());
        assert_eq!(outcome, SignalOutcome::Quiet);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<Decimal> = (0..20).map(|i| Decimal::from(100 + i)).collect();
        assert_eq!(wilder_rsi(&prices, 14), dec!(100));
    }

    #[test]
    fn test_rsi_insufficient_history_is_neutral() {
        let prices = vec![dec!(1), dec!(2)];
        assert_eq!(wilder_rsi(&prices, 14), dec!(50));
    }

    #[test]
    fn test_rsi_mixed_in_range() {
        let prices: Vec<Decimal> = vec![
            dec!(100),
            dec!(99),
            dec!(101),
            dec!(98),
            dec!(97),
            dec!(99),
            dec!(96),
            dec!(95),
            dec!(97),
            dec!(94),
            dec!(93),
            dec!(95),
            dec!(92),
            dec!(91),
            dec!(93),
            dec!(90),
        ];
        let rsi = wilder_rsi(&prices, 14);
        assert!(rsi > Decimal::ZERO && rsi < dec!(100));
        // Downtrend: should read oversold territory.
        assert!(rsi < dec!(50));
    }
}
