//! Order execution abstraction.
//!
//! The engine never talks to an exchange directly: it goes through the
//! `Executor` trait, and it treats any non-success result - including a
//! timeout - as "no position". An `OrderConfirmation` is only ever
//! constructed by an executor on confirmed success, and position
//! registration requires one, so a position cannot exist without a
//! confirmed externally-placed order.
//!
//! `PaperExecutor` simulates fills for paper trading; a live transport
//! with request signing is an external collaborator and is not part of
//! this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use edge_common::{Outcome, Side};

use crate::types::Market;

/// Errors that can occur during order execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Insufficient funds: available={available}, required={required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("Market closed")]
    MarketClosed,

    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-generated request id for tracking.
    pub request_id: String,
    /// Market this order belongs to.
    pub market_id: String,
    /// Token to trade.
    pub token_id: String,
    /// YES or NO outcome the token represents.
    pub outcome: Outcome,
    /// Buy (entry) or Sell (exit).
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Size in shares.
    pub shares: Decimal,
}

impl OrderRequest {
    pub fn new(
        market_id: &str,
        token_id: &str,
        outcome: Outcome,
        side: Side,
        price: Decimal,
        shares: Decimal,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            market_id: market_id.to_string(),
            token_id: token_id.to_string(),
            outcome,
            side,
            price,
            shares,
        }
    }

    /// Notional cost of this order.
    pub fn cost(&self) -> Decimal {
        self.price * self.shares
    }
}

/// Proof of a confirmed order placement.
///
/// Only executors construct this, and only after the venue confirmed
/// the order. Position registration demands one by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub placed_price: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// Order execution interface.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Place an order; `Err` (of any kind) means no position exists.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderConfirmation, ExecutorError>;

    /// Cancel a resting order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutorError>;
}

/// Wrap an order placement in a bounded timeout. A timeout is treated
/// identically to an explicit failure: no confirmation, no position.
pub async fn place_with_timeout(
    executor: &dyn Executor,
    request: &OrderRequest,
    timeout: Duration,
) -> Result<OrderConfirmation, ExecutorError> {
    match tokio::time::timeout(timeout, executor.place_order(request)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                request_id = %request.request_id,
                market_id = %request.market_id,
                "order placement timed out - treating as failure"
            );
            Err(ExecutorError::Timeout(timeout))
        }
    }
}

/// Compute an entry limit price: aggressive enough to fill quickly, but
/// capped at `slippage_tolerance` above the mid. Prices are for the
/// token actually being bought, so NO quotes use the complement book.
pub fn entry_limit_price(
    market: &Market,
    outcome: Outcome,
    slippage_tolerance: Decimal,
) -> Option<Decimal> {
    let book = market.book.as_ref()?;
    let (ask, mid) = match outcome {
        Outcome::Yes => {
            let ask = book.best_ask()?;
            (ask, book.mid_price().unwrap_or(ask))
        }
        Outcome::No => {
            // Buying NO fills against YES bids; complement the quotes.
            let bid = book.best_bid()?;
            let no_ask = Decimal::ONE - bid;
            let no_mid = Decimal::ONE - book.mid_price().unwrap_or(bid);
            (no_ask, no_mid)
        }
    };
    let limit = (ask * dec!(1.005)).min(mid * (Decimal::ONE + slippage_tolerance));
    Some(limit.min(dec!(0.99)).round_dp(4))
}

/// Simulated executor for paper trading: every order fills at its limit
/// price after an optional latency.
#[derive(Debug)]
pub struct PaperExecutor {
    fill_latency: Duration,
    orders_placed: AtomicU64,
}

impl PaperExecutor {
    pub fn new(fill_latency: Duration) -> Self {
        Self {
            fill_latency,
            orders_placed: AtomicU64::new(0),
        }
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::Relaxed)
    }
}

impl Default for PaperExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(0))
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderConfirmation, ExecutorError> {
        if request.shares <= Decimal::ZERO {
            return Err(ExecutorError::InvalidOrder(format!(
                "size {}",
                request.shares
            )));
        }
        if request.price <= Decimal::ZERO || request.price >= Decimal::ONE {
            return Err(ExecutorError::InvalidOrder(format!(
                "price {}",
                request.price
            )));
        }

        if !self.fill_latency.is_zero() {
            tokio::time::sleep(self.fill_latency).await;
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
        info!(
            order_id = %order_id,
            market_id = %request.market_id,
            side = %request.side,
            outcome = %request.outcome,
            price = %request.price,
            shares = %request.shares,
            "paper order filled"
        );
        Ok(OrderConfirmation {
            order_id,
            placed_price: request.price,
            placed_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutorError> {
        info!(order_id = %order_id, "paper order cancelled");
        Ok(())
    }
}
