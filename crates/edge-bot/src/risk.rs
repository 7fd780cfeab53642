//! Session risk ledger: exposure, realized P&L, trade frequency, and
//! loss streaks.
//!
//! The ledger is mutated only by position open/close events; every
//! gating decision reads an immutable snapshot. The actual gate checks
//! live in the edge evaluator so that a verdict carries its own
//! rejection reasons.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Point-in-time view of the risk ledger.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// USDC at risk across all open positions.
    pub open_exposure: Decimal,
    /// Realized P&L this session.
    pub realized_pnl: Decimal,
    /// Entries placed within the trailing hour.
    pub trades_last_hour: usize,
    /// Consecutive losing closes (reset by any winning close).
    pub consecutive_losses: u32,
}

#[derive(Debug, Default)]
struct LedgerState {
    open_exposure: Decimal,
    realized_pnl: Decimal,
    entry_times: VecDeque<DateTime<Utc>>,
    consecutive_losses: u32,
}

/// Running session risk totals.
#[derive(Debug, Default)]
pub struct RiskLedger {
    inner: RwLock<LedgerState>,
}

impl RiskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed position open.
    pub fn record_open(&self, stake: Decimal, now: DateTime<Utc>) {
        let mut state = self.inner.write();
        state.open_exposure += stake;
        state.entry_times.push_back(now);
    }

    /// Record a position close with its realized P&L.
    pub fn record_close(&self, stake: Decimal, pnl: Decimal) {
        let mut state = self.inner.write();
        state.open_exposure = (state.open_exposure - stake).max(Decimal::ZERO);
        state.realized_pnl += pnl;
        if pnl <= Decimal::ZERO {
            state.consecutive_losses += 1;
            if state.consecutive_losses > 1 {
                info!(
                    streak = state.consecutive_losses,
                    "consecutive loss streak extended"
                );
            }
        } else {
            state.consecutive_losses = 0;
        }
    }

    /// Exposure adjustment for an adopted position (no entry-rate impact).
    pub fn record_adoption(&self, stake: Decimal) {
        self.inner.write().open_exposure += stake;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RiskSnapshot {
        let mut state = self.inner.write();
        let cutoff = now - Duration::hours(1);
        while state
            .entry_times
            .front()
            .is_some_and(|t| *t < cutoff)
        {
            state.entry_times.pop_front();
        }
        RiskSnapshot {
            open_exposure: state.open_exposure,
            realized_pnl: state.realized_pnl,
            trades_last_hour: state.entry_times.len(),
            consecutive_losses: state.consecutive_losses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_close_exposure() {
        let ledger = RiskLedger::new();
        let now = Utc::now();
        ledger.record_open(dec!(25), now);
        ledger.record_open(dec!(40), now);
        assert_eq!(ledger.snapshot(now).open_exposure, dec!(65));

        ledger.record_close(dec!(25), dec!(5));
        let snap = ledger.snapshot(now);
        assert_eq!(snap.open_exposure, dec!(40));
        assert_eq!(snap.realized_pnl, dec!(5));
    }

    #[test]
    fn test_rolling_hour_window() {
        let ledger = RiskLedger::new();
        let now = Utc::now();
        ledger.record_open(dec!(10), now - Duration::minutes(90));
        ledger.record_open(dec!(10), now - Duration::minutes(30));
        ledger.record_open(dec!(10), now);

        let snap = ledger.snapshot(now);
        assert_eq!(snap.trades_last_hour, 2);
    }

    #[test]
    fn test_loss_streak_resets_on_win() {
        let ledger = RiskLedger::new();
        let now = Utc::now();
        ledger.record_close(dec!(10), dec!(-3));
        ledger.record_close(dec!(10), dec!(-2));
        assert_eq!(ledger.snapshot(now).consecutive_losses, 2);

        ledger.record_close(dec!(10), dec!(7));
        assert_eq!(ledger.snapshot(now).consecutive_losses, 0);
    }

    #[test]
    fn test_breakeven_counts_as_loss() {
        let ledger = RiskLedger::new();
        ledger.record_close(dec!(10), Decimal::ZERO);
        assert_eq!(ledger.snapshot(Utc::now()).consecutive_losses, 1);
    }

    #[test]
    fn test_exposure_never_negative() {
        let ledger = RiskLedger::new();
        ledger.record_close(dec!(10), dec!(1));
        assert_eq!(ledger.snapshot(Utc::now()).open_exposure, Decimal::ZERO);
    }
}
