//! Position registry and exit state machine.
//!
//! The manager owns the registry of positions keyed by market id.
//! Registration requires an `OrderConfirmation` and rejects duplicates
//! for a market that is already open - both halves of the phantom/
//! duplicate-exposure invariant. The monitor pass evaluates exits in
//! strict priority order: the time stop preempts take-profit and
//! stop-loss so a position is always closed before settlement.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use edge_common::Side;

use crate::config::PositionConfig;
use crate::executor::{place_with_timeout, Executor, OrderRequest};
use crate::feed::MarketFeed;
use crate::journal::{TradeJournal, TradeRecord};
use crate::position::{ExitReason, Position, PositionState};
use crate::risk::RiskLedger;

/// Invariant violations on registration. These are rejected and logged
/// at error level - never silently ignored.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("market {market_id} already has an open position")]
    DuplicateOpenPosition { market_id: String },
}

/// Summary of closed trades this session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub closed: usize,
    pub wins: usize,
    pub total_pnl: Decimal,
}

/// Owns the registry of positions and runs the exit state machine.
pub struct PositionManager {
    config: PositionConfig,
    order_timeout: std::time::Duration,
    registry: RwLock<HashMap<String, Position>>,
    feed: Arc<dyn MarketFeed>,
    executor: Arc<dyn Executor>,
    risk: Arc<RiskLedger>,
    journal: Arc<TradeJournal>,
}

impl PositionManager {
    pub fn new(
        config: PositionConfig,
        order_timeout: std::time::Duration,
        feed: Arc<dyn MarketFeed>,
        executor: Arc<dyn Executor>,
        risk: Arc<RiskLedger>,
        journal: Arc<TradeJournal>,
    ) -> Self {
        Self {
            config,
            order_timeout,
            registry: RwLock::new(HashMap::new()),
            feed,
            executor,
            risk,
            journal,
        }
    }

    /// True only if this market has an open (non-closed) position.
    /// Each 15-minute window is its own market id, so a closed position
    /// never blocks the next window.
    pub fn has_open(&self, market_id: &str) -> bool {
        self.registry
            .read()
            .get(market_id)
            .is_some_and(|p| p.is_open())
    }

    pub fn open_count(&self) -> usize {
        self.registry.read().values().filter(|p| p.is_open()).count()
    }

    /// Total USDC at risk across open positions.
    pub fn open_exposure(&self) -> Decimal {
        self.registry
            .read()
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.stake)
            .sum()
    }

    /// Open token ids, used by reconciliation.
    pub fn open_token_ids(&self) -> Vec<String> {
        self.registry
            .read()
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.token_id.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.registry.read().values().cloned().collect()
    }

    /// Register a position created from a confirmed order and move it
    /// straight to `Monitoring`.
    pub fn register(&self, mut position: Position) -> Result<(), RegistrationError> {
        let mut registry = self.registry.write();
        if registry
            .get(&position.market_id)
            .is_some_and(|p| p.is_open())
        {
            error!(
                market_id = %position.market_id,
                "registration rejected: market already has an open position"
            );
            return Err(RegistrationError::DuplicateOpenPosition {
                market_id: position.market_id,
            });
        }
        position.state = PositionState::Monitoring;
        info!(
            market_id = %position.market_id,
            side = %position.side,
            entry = %position.entry_price,
            stake = %position.stake,
            strategy = %position.strategy,
            "position opened"
        );
        registry.insert(position.market_id.clone(), position);
        Ok(())
    }

    /// Adopt an externally-held position (reconciliation). Same
    /// duplicate discipline as `register`; exposure is recorded but the
    /// rolling-hour entry rate is untouched.
    pub fn adopt(&self, position: Position) -> Result<(), RegistrationError> {
        let stake = position.stake;
        self.register(position)?;
        self.risk.record_adoption(stake);
        Ok(())
    }

    /// One monitoring pass over every open position.
    pub async fn monitor_once(&self, now: DateTime<Utc>) {
        let open: Vec<Position> = self
            .registry
            .read()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect();

        for position in open {
            if let Err(e) = self.evaluate_position(&position, now).await {
                error!(
                    market_id = %position.market_id,
                    error = %e,
                    "position evaluation failed"
                );
            }
        }
    }

    /// Evaluate one position against the exit conditions, in priority
    /// order: (1) time stop, (2) take profit, (3) stop loss.
    async fn evaluate_position(
        &self,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Result<(), crate::feed::FeedError> {
        let secs_left = position.seconds_remaining(now);

        // Exit 1: time stop. Checked before any price comparison so an
        // imminent settlement always wins, even when the price source
        // is unusable or take-profit also holds.
        if secs_left <= self.config.time_stop_buffer_secs {
            info!(
                market_id = %position.market_id,
                secs_left,
                "time stop - forcing exit before settlement"
            );
            let mark = self.feed.mark_price(&position.token_id).await.ok();
            let exit_price = mark
                .and_then(|m| m.reliable())
                .unwrap_or(position.entry_price);
            self.exit_position(&position.market_id, exit_price, ExitReason::TimeExpiry)
                .await;
            return Ok(());
        }

        let mark = self.feed.mark_price(&position.token_id).await?;
        let price = match mark.reliable() {
            Some(p) => {
                if mark.last_is_placeholder {
                    warn!(
                        market_id = %position.market_id,
                        mid = %p,
                        "last trade is a placeholder - using book mid for exit checks"
                    );
                }
                p
            }
            None => {
                warn!(
                    market_id = %position.market_id,
                    "placeholder price with no book mid - skipping TP/SL this pass"
                );
                return Ok(());
            }
        };

        // Exit 2: take profit.
        let take_profit_at = position.entry_price * self.config.take_profit_multiplier;
        if price >= take_profit_at {
            info!(
                market_id = %position.market_id,
                entry = %position.entry_price,
                price = %price,
                "take profit hit"
            );
            self.exit_position(&position.market_id, price, ExitReason::TakeProfit)
                .await;
            return Ok(());
        }

        // Exit 3: stop loss, after the minimum hold.
        if price <= self.config.stop_loss_threshold {
            if position.age_seconds(now) < self.config.min_hold_secs {
                debug!(
                    market_id = %position.market_id,
                    "stop level touched inside min hold - ignoring"
                );
                return Ok(());
            }
            warn!(
                market_id = %position.market_id,
                entry = %position.entry_price,
                price = %price,
                "stop loss hit"
            );
            self.exit_position(&position.market_id, price, ExitReason::StopLoss)
                .await;
            return Ok(());
        }

        debug!(
            market_id = %position.market_id,
            price = %price,
            secs_left,
            "holding"
        );
        Ok(())
    }

    /// Place the exit order and close the position. An exit order
    /// failure is logged but the position is still closed locally -
    /// the registry must not keep monitoring a position the venue is
    /// about to settle.
    pub async fn exit_position(&self, market_id: &str, exit_price: Decimal, reason: ExitReason) {
        let Some(position) = self
            .registry
            .read()
            .get(market_id)
            .filter(|p| p.is_open())
            .cloned()
        else {
            return;
        };

        let min_sell = (exit_price * dec!(0.97)).max(dec!(0.01)).round_dp(4);
        let request = OrderRequest::new(
            &position.market_id,
            &position.token_id,
            position.side,
            Side::Sell,
            min_sell,
            position.shares,
        );
        if let Err(e) = place_with_timeout(self.executor.as_ref(), &request, self.order_timeout).await
        {
            error!(
                market_id = %market_id,
                reason = %reason,
                error = %e,
                "exit order failed - closing position locally"
            );
        }

        let now = Utc::now();
        let closed = {
            let mut registry = self.registry.write();
            let Some(position) = registry.get_mut(market_id) else {
                return;
            };
            position.state = PositionState::Closed;
            position.exit_price = Some(exit_price);
            position.exit_time = Some(now);
            position.exit_reason = Some(reason);
            position.clone()
        };

        let pnl = closed.realized_pnl().unwrap_or(Decimal::ZERO);
        self.risk.record_close(closed.stake, pnl);
        info!(
            market_id = %market_id,
            reason = %reason,
            pnl = %pnl,
            "position closed"
        );

        self.journal.append_or_warn(&TradeRecord {
            market_id: closed.market_id.clone(),
            question: closed.question.clone(),
            side: closed.side,
            entry_price: closed.entry_price,
            exit_price,
            stake: closed.stake,
            shares: closed.shares,
            pnl,
            entry_time: closed.entry_time,
            exit_time: now,
            duration_secs: (now - closed.entry_time).num_seconds(),
            exit_reason: reason.as_str().to_string(),
            strategy: closed.strategy.clone(),
        });
    }

    /// Force-exit every open position and wait for all exits to finish.
    /// The shutdown path must not return until this has completed.
    pub async fn close_all(&self) {
        let open: Vec<Position> = self
            .registry
            .read()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect();
        if open.is_empty() {
            return;
        }
        info!(count = open.len(), "shutdown: closing all open positions");

        let exits = open.iter().map(|position| async {
            let mark = self.feed.mark_price(&position.token_id).await.ok();
            let exit_price = mark
                .and_then(|m| m.reliable())
                .unwrap_or(position.entry_price);
            self.exit_position(&position.market_id, exit_price, ExitReason::Shutdown)
                .await;
        });
        join_all(exits).await;
        info!("shutdown: all positions closed");
    }

    /// Closed-trade summary for the session log.
    pub fn session_stats(&self) -> SessionStats {
        let registry = self.registry.read();
        let closed: Vec<&Position> = registry
            .values()
            .filter(|p| p.state == PositionState::Closed)
            .collect();
        let total_pnl = closed
            .iter()
            .filter_map(|p| p.realized_pnl())
            .sum::<Decimal>();
        let wins = closed
            .iter()
            .filter(|p| p.realized_pnl().unwrap_or(Decimal::ZERO) > Decimal::ZERO)
            .count();
        SessionStats {
            closed: closed.len(),
            wins,
            total_pnl,
        }
    }
}
