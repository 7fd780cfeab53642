//! Position lifecycle: state machine, registry, monitoring, and
//! reconciliation against the external ledger.

pub mod manager;
pub mod reconcile;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use edge_common::{CryptoAsset, Outcome};

use crate::executor::OrderConfirmation;

/// Lifecycle state of a position.
///
/// `Open -> Monitoring` happens immediately once registration succeeds;
/// `Monitoring -> Closed` happens through exactly one `ExitReason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    Monitoring,
    Closed,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::Open => write!(f, "OPEN"),
            PositionState::Monitoring => write!(f, "MONITORING"),
            PositionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeExpiry,
    Shutdown,
    OrphanResolved,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TimeExpiry => "TIME_EXPIRY",
            ExitReason::Shutdown => "SHUTDOWN",
            ExitReason::OrphanResolved => "ORPHAN_RESOLVED",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An open or closed position. Prices are *effective* for the held
/// side: a NO position's entry/exit prices are the complement of the
/// YES quotes, which makes the realized P&L formula uniform across
/// sides and exit reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub question: String,
    pub asset: Option<CryptoAsset>,
    pub side: Outcome,
    pub token_id: String,
    /// Effective entry price for the held token.
    pub entry_price: Decimal,
    /// USDC committed at entry.
    pub stake: Decimal,
    /// Shares held.
    pub shares: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Market resolution deadline.
    pub deadline: DateTime<Utc>,
    pub state: PositionState,
    /// Strategy profile that authorized the entry.
    pub strategy: String,
    /// Confirmed order id backing this position.
    pub order_id: String,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Build a position from a confirmed order. Taking the
    /// confirmation by value is what keeps phantom positions
    /// unrepresentable: only an executor success produces one.
    #[allow(clippy::too_many_arguments)]
    pub fn from_confirmed_order(
        market_id: String,
        question: String,
        asset: Option<CryptoAsset>,
        side: Outcome,
        token_id: String,
        stake: Decimal,
        deadline: DateTime<Utc>,
        strategy: String,
        confirmation: OrderConfirmation,
    ) -> Self {
        let entry_price = confirmation.placed_price;
        let shares = if entry_price > Decimal::ZERO {
            (stake / entry_price).round_dp(4)
        } else {
            Decimal::ZERO
        };
        Self {
            market_id,
            question,
            asset,
            side,
            token_id,
            entry_price,
            stake,
            shares,
            entry_time: confirmation.placed_at,
            deadline,
            state: PositionState::Open,
            strategy,
            order_id: confirmation.order_id,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != PositionState::Closed
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds()
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_seconds()
    }

    /// Realized P&L, uniform across sides and exit reasons:
    /// (exit - entry) * shares over effective prices.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        self.exit_price
            .map(|exit| (exit - self.entry_price) * self.shares)
    }
}
