//! Integration tests for the position lifecycle.
//!
//! These tests verify the registry invariants and the exit state
//! machine end-to-end:
//! - No registration without a confirmed order, even under failures
//! - At most one open position per market under concurrent entries
//! - Exit priority (time stop preempts take profit)
//! - P&L round trips for YES and NO positions
//! - Shutdown draining
//! - Reconciliation idempotence

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use edge_bot::config::{PositionConfig, ReconcileConfig};
use edge_bot::executor::{Executor, ExecutorError, OrderConfirmation, OrderRequest, PaperExecutor};
use edge_bot::feed::{FeedError, MarketFeed};
use edge_bot::journal::TradeJournal;
use edge_bot::position::manager::PositionManager;
use edge_bot::position::reconcile::{ExternalPosition, LedgerError, PositionLedger, Reconciler};
use edge_bot::position::{ExitReason, Position, PositionState};
use edge_bot::risk::RiskLedger;
use edge_bot::types::{MarkPrice, Market, OrderBook, PriceLevel};
use edge_common::{CryptoAsset, Outcome, Side};

// ============================================================================
// Fixtures
// ============================================================================

struct FixedFeed {
    mark: MarkPrice,
}

#[async_trait]
impl MarketFeed for FixedFeed {
    async fn active_markets(&self) -> Result<Vec<Market>, FeedError> {
        Ok(vec![])
    }

    async fn mark_price(&self, _token_id: &str) -> Result<MarkPrice, FeedError> {
        Ok(self.mark)
    }

    async fn spot_price(&self, _asset: CryptoAsset) -> Result<Decimal, FeedError> {
        Err(FeedError::Unavailable("fixture".into()))
    }

    async fn funding_rate(&self, _asset: CryptoAsset) -> Result<Decimal, FeedError> {
        Err(FeedError::Unavailable("fixture".into()))
    }
}

fn mark(price: Decimal) -> MarkPrice {
    MarkPrice {
        last: Some(price),
        last_is_placeholder: false,
        book_mid: Some(price),
    }
}

fn manager_at_mark(
    price: Decimal,
    config: PositionConfig,
) -> (Arc<PositionManager>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(PositionManager::new(
        config,
        StdDuration::from_secs(2),
        Arc::new(FixedFeed { mark: mark(price) }),
        Arc::new(PaperExecutor::default()),
        Arc::new(RiskLedger::new()),
        Arc::new(TradeJournal::new(dir.path().join("trades.csv"))),
    ));
    (manager, dir)
}

fn confirmed(entry: Decimal) -> OrderConfirmation {
    OrderConfirmation {
        order_id: format!("ord-{entry}"),
        placed_price: entry,
        placed_at: Utc::now(),
    }
}

fn position(
    market_id: &str,
    side: Outcome,
    entry: Decimal,
    shares: Decimal,
    deadline_secs: i64,
) -> Position {
    let mut position = Position::from_confirmed_order(
        market_id.to_string(),
        format!("{market_id} question"),
        Some(CryptoAsset::Btc),
        side,
        format!("{market_id}-tok"),
        entry * shares,
        Utc::now() + Duration::seconds(deadline_secs),
        "MOMENTUM_CARRY".to_string(),
        confirmed(entry),
    );
    position.shares = shares;
    position
}

// ============================================================================
// Phantom-position invariant
// ============================================================================

/// An executor that always fails and counts the attempts.
struct FailingExecutor {
    attempts: AtomicUsize,
}

#[async_trait]
impl Executor for FailingExecutor {
    async fn place_order(
        &self,
        _request: &OrderRequest,
    ) -> Result<OrderConfirmation, ExecutorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExecutorError::Connection("refused".into()))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_no_position_without_confirmed_order() {
    // Simulated placement failures: every confirmation attempt errors,
    // so no Position can be constructed at all - the registry stays
    // empty no matter how many entries are attempted.
    let executor = FailingExecutor {
        attempts: AtomicUsize::new(0),
    };
    let request = OrderRequest::new("m1", "tok", Outcome::Yes, Side::Buy, dec!(0.50), dec!(100));

    for _ in 0..5 {
        let result = executor.place_order(&request).await;
        assert!(result.is_err());
    }
    assert_eq!(executor.attempts.load(Ordering::SeqCst), 5);

    // Registration is impossible without a confirmation value; the
    // only way to fabricate one is through a successful placement.
    let (manager, _dir) = manager_at_mark(dec!(0.50), PositionConfig::default());
    assert_eq!(manager.open_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_open_position_per_market_under_concurrency() {
    let (manager, _dir) = manager_at_mark(dec!(0.50), PositionConfig::default());

    // Eight tasks race to register a position for the same market.
    let mut handles = Vec::new();
    for i in 0..8i64 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let entry = dec!(0.40) + Decimal::new(i, 3);
            manager.register(position("contested", Outcome::Yes, entry, dec!(10), 600))
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "exactly one registration may win");
    assert_eq!(manager.open_count(), 1);
}

// ============================================================================
// Exit priority and P&L
// ============================================================================

#[tokio::test]
async fn test_time_expiry_preempts_take_profit() {
    // Mark far above take profit AND inside the time-stop buffer.
    let (manager, _dir) = manager_at_mark(dec!(0.90), PositionConfig::default());
    manager
        .register(position("m1", Outcome::Yes, dec!(0.40), dec!(100), 45))
        .unwrap();

    manager.monitor_once(Utc::now()).await;

    let positions = manager.snapshot();
    assert_eq!(positions[0].state, PositionState::Closed);
    assert_eq!(positions[0].exit_reason, Some(ExitReason::TimeExpiry));
}

#[tokio::test]
async fn test_yes_pnl_round_trip() {
    let (manager, _dir) = manager_at_mark(dec!(0.70), PositionConfig::default());
    manager
        .register(position("m1", Outcome::Yes, dec!(0.40), dec!(100), 600))
        .unwrap();

    // 0.70 < 1.8 * 0.40 = 0.72, so force the exit directly.
    manager
        .exit_position("m1", dec!(0.70), ExitReason::TakeProfit)
        .await;

    let positions = manager.snapshot();
    assert_eq!(positions[0].realized_pnl(), Some(dec!(30.00)));
}

#[tokio::test]
async fn test_no_pnl_round_trip() {
    // NO entered at effective 0.55 (YES mid 0.45), exited at effective
    // 0.20: realized P&L = (0.20 - 0.55) * 100 = -35.00.
    let (manager, _dir) = manager_at_mark(dec!(0.20), PositionConfig::default());
    manager
        .register(position("m1", Outcome::No, dec!(0.55), dec!(100), 600))
        .unwrap();

    manager
        .exit_position("m1", dec!(0.20), ExitReason::StopLoss)
        .await;

    let positions = manager.snapshot();
    assert_eq!(positions[0].realized_pnl(), Some(dec!(-35.00)));
}

// ============================================================================
// Shutdown draining
// ============================================================================

#[tokio::test]
async fn test_shutdown_waits_for_both_exits() {
    let (manager, _dir) = manager_at_mark(dec!(0.50), PositionConfig::default());
    manager
        .register(position("m1", Outcome::Yes, dec!(0.40), dec!(100), 600))
        .unwrap();
    manager
        .register(position("m2", Outcome::No, dec!(0.55), dec!(50), 600))
        .unwrap();

    manager.close_all().await;

    // close_all returned: both positions must already be CLOSED.
    let positions = manager.snapshot();
    assert_eq!(positions.len(), 2);
    for position in &positions {
        assert_eq!(position.state, PositionState::Closed);
        assert_eq!(position.exit_reason, Some(ExitReason::Shutdown));
    }
    assert_eq!(manager.open_count(), 0);
}

// ============================================================================
// Reconciliation
// ============================================================================

struct FixedLedger {
    positions: Vec<ExternalPosition>,
}

#[async_trait]
impl PositionLedger for FixedLedger {
    async fn list_open_positions(&self) -> Result<Vec<ExternalPosition>, LedgerError> {
        Ok(self.positions.clone())
    }
}

fn reconcile_market(id: &str) -> Market {
    Market {
        market_id: id.to_string(),
        question: "Ethereum Up or Down?".to_string(),
        yes_token_id: format!("{id}-yes"),
        no_token_id: format!("{id}-no"),
        deadline: Utc::now() + Duration::minutes(10),
        book: Some(OrderBook {
            bids: vec![PriceLevel::new(dec!(0.44), dec!(200))],
            asks: vec![PriceLevel::new(dec!(0.46), dec!(200))],
            timestamp: None,
        }),
        no_book: None,
        price_history: vec![],
    }
}

#[tokio::test]
async fn test_reconcile_twice_adopts_once() {
    let (manager, _dir) = manager_at_mark(dec!(0.50), PositionConfig::default());
    let reconciler = Reconciler::new(
        ReconcileConfig::default(),
        Arc::new(FixedLedger {
            positions: vec![ExternalPosition {
                token_id: "m1-yes".into(),
                size: dec!(60),
                avg_price: Some(dec!(0.45)),
            }],
        }),
        manager.clone(),
    );
    let markets = vec![reconcile_market("m1")];

    let first = reconciler.reconcile(&markets, Utc::now()).await.unwrap();
    let second = reconciler.reconcile(&markets, Utc::now()).await.unwrap();

    assert_eq!(first.adopted.len(), 1);
    assert!(second.adopted.is_empty(), "idempotence violated");
    assert_eq!(manager.open_count(), 1);

    // The adopted position monitors under the normal exit rules.
    let positions = manager.snapshot();
    assert_eq!(positions[0].state, PositionState::Monitoring);
    assert_eq!(positions[0].strategy, "ORPHAN");
}

#[tokio::test]
async fn test_adopted_position_exits_like_any_other() {
    // Adopted at 0.45; the mark sits above take-profit (1.8x = 0.81).
    let (manager, _dir) = manager_at_mark(dec!(0.85), PositionConfig::default());
    let reconciler = Reconciler::new(
        ReconcileConfig::default(),
        Arc::new(FixedLedger {
            positions: vec![ExternalPosition {
                token_id: "m1-yes".into(),
                size: dec!(60),
                avg_price: Some(dec!(0.45)),
            }],
        }),
        manager.clone(),
    );
    reconciler
        .reconcile(&[reconcile_market("m1")], Utc::now())
        .await
        .unwrap();

    manager.monitor_once(Utc::now()).await;

    let positions = manager.snapshot();
    assert_eq!(positions[0].state, PositionState::Closed);
    assert_eq!(positions[0].exit_reason, Some(ExitReason::TakeProfit));
}
