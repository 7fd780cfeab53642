//! Asset-specific strategy signals.
//!
//! Each strategy declares its own disqualifying kill switch; a kill
//! switch reports `Suppressed` (never plain `Quiet`) so the log trail
//! distinguishes "condition absent" from "edge already priced in".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use edge_common::{CryptoAsset, Outcome};

use crate::config::{CarryConfig, SqueezeConfig};
use crate::state::{BroadcastState, CatalystStore, TelemetrySnapshot};
use crate::strategy::signals::{wilder_rsi, SignalOutcome};
use crate::types::Market;

const RSI_PERIOD: usize = 14;

/// Momentum carry on the anchor asset: a sustained spot move from the
/// window open that the market has not fully priced yet.
///
/// Kill switch: if the move already exceeds `max_entry_move`, the edge
/// is priced in and the signal is suppressed.
pub fn momentum_carry(snapshot: &TelemetrySnapshot, config: &CarryConfig) -> SignalOutcome {
    let Some(pct_move) = snapshot.pct_move_from_open() else {
        return SignalOutcome::Quiet;
    };

    if pct_move.abs() > config.max_entry_move {
        info!(
            pct_move = %pct_move,
            ceiling = %config.max_entry_move,
            "momentum carry kill switch: move already priced in"
        );
        return SignalOutcome::Suppressed {
            reason: format!("move {} exceeds entry ceiling {}", pct_move, config.max_entry_move),
        };
    }

    let direction = if pct_move >= config.threshold {
        Outcome::Yes
    } else if pct_move <= -config.threshold {
        Outcome::No
    } else {
        return SignalOutcome::Quiet;
    };

    // Directional consistency over the last few spot ticks.
    let prices = &snapshot.recent_prices;
    if prices.len() >= 5 {
        let tail = &prices[prices.len() - 5..];
        let mut aligned = 0u32;
        let mut steps = 0u32;
        for pair in tail.windows(2) {
            let delta = pair[1] - pair[0];
            steps += 1;
            let matches_direction = match direction {
                Outcome::Yes => delta > Decimal::ZERO,
                Outcome::No => delta < Decimal::ZERO,
            };
            if matches_direction {
                aligned += 1;
            }
        }
        if steps > 0 && Decimal::from(aligned) / Decimal::from(steps) < config.consistency {
            return SignalOutcome::Quiet;
        }
    }

    SignalOutcome::fired(Some(direction))
}

/// Lag follow on a dependent asset: the anchor fired a directional
/// broadcast and this market's odds have not repriced yet.
///
/// The broadcast is time-gated here - an expired entry never fires the
/// signal, regardless of write ordering.
pub fn lag_follow(
    broadcast: &BroadcastState,
    market_mid: Decimal,
    max_repricing: Decimal,
    now: DateTime<Utc>,
) -> SignalOutcome {
    let Some(signal) = broadcast.active(now) else {
        return SignalOutcome::Quiet;
    };

    let distance = (market_mid - Decimal::new(5, 1)).abs();
    if distance > max_repricing {
        return SignalOutcome::Quiet;
    }

    info!(
        anchor = %signal.asset,
        direction = %signal.direction,
        magnitude = %signal.magnitude,
        mid = %market_mid,
        "lag window open: anchor moved, odds not repriced"
    );
    SignalOutcome::fired(Some(signal.direction))
}

/// Squeeze reversal: deeply negative funding plus an oversold market
/// with a confirmed uptick, early in the window.
///
/// Kill switch: entries are only allowed in the first
/// `max_entry_minutes` of the window.
pub fn squeeze_reversal(
    market: &Market,
    snapshot: &TelemetrySnapshot,
    anchor_supportive: bool,
    config: &SqueezeConfig,
    now: DateTime<Utc>,
) -> SignalOutcome {
    let Some(funding) = snapshot.funding_rate else {
        return SignalOutcome::Quiet;
    };
    if funding > config.funding_threshold {
        return SignalOutcome::Quiet;
    }
    if !anchor_supportive {
        return SignalOutcome::Quiet;
    }

    let minutes_in = market.minutes_into_window(now);
    if minutes_in > config.max_entry_minutes {
        info!(
            minutes_in,
            limit = config.max_entry_minutes,
            "squeeze kill switch: entry window elapsed"
        );
        return SignalOutcome::Suppressed {
            reason: format!("{} min into window exceeds {}", minutes_in, config.max_entry_minutes),
        };
    }

    let prices: Vec<Decimal> = market.price_history.iter().map(|t| t.price).collect();
    if prices.len() < RSI_PERIOD + 1 {
        return SignalOutcome::Quiet;
    }
    let rsi = wilder_rsi(&prices, RSI_PERIOD);
    if rsi >= config.rsi_oversold {
        return SignalOutcome::Quiet;
    }

    // Uptick confirmation: latest tick off the local low of the last 3.
    let recent = &prices[prices.len() - 3..];
    let local_low = recent.iter().copied().min().unwrap_or(Decimal::ZERO);
    let latest = recent[recent.len() - 1];
    if local_low <= Decimal::ZERO {
        return SignalOutcome::Quiet;
    }
    let uptick = (latest - local_low) / local_low;
    if uptick < config.min_uptick {
        return SignalOutcome::Quiet;
    }

    info!(funding = %funding, rsi = %rsi, uptick = %uptick, "squeeze setup confirmed");
    SignalOutcome::fired(Some(Outcome::Yes))
}

/// Catalyst override: fires only while an unexpired flag for this asset
/// is active. The check clears expired flags itself - that
/// responsibility belongs to no other caller.
pub fn catalyst(
    store: &CatalystStore,
    asset: CryptoAsset,
    now: DateTime<Utc>,
) -> SignalOutcome {
    match store.check(asset, now) {
        Some(flag) => {
            info!(asset = %asset, direction = %flag.direction, reason = %flag.reason, "catalyst active");
            SignalOutcome::fired(Some(flag.direction))
        }
        None => SignalOutcome::Quiet,
    }
}
