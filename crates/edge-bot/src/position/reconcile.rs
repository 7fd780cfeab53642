//! Reconciliation of the local registry against the external ledger.
//!
//! Orphans arise from passive order pairs where only one leg filled,
//! manual positions, or restarts. An externally-held position absent
//! locally is adopted into `Monitoring` under the normal exit rules -
//! that closes the single-sided-exposure gap. A locally-held position
//! absent externally is only *flagged* after a grace period, never
//! silently dropped: the external query itself may be transiently
//! wrong.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use edge_common::Outcome;

use crate::config::ReconcileConfig;
use crate::executor::OrderConfirmation;
use crate::position::manager::PositionManager;
use crate::position::Position;
use crate::types::Market;

/// Errors from the external position ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// A position as reported by the external ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPosition {
    pub token_id: String,
    pub size: Decimal,
    pub avg_price: Option<Decimal>,
}

/// External ground-truth position query, used exclusively by
/// reconciliation.
#[async_trait]
pub trait PositionLedger: Send + Sync {
    async fn list_open_positions(&self) -> Result<Vec<ExternalPosition>, LedgerError>;
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Market ids adopted this pass.
    pub adopted: Vec<String>,
    /// Token ids currently flagged stale.
    pub flagged_stale: Vec<String>,
}

/// Periodically diffs the registry against the external ledger.
pub struct Reconciler {
    config: ReconcileConfig,
    ledger: Arc<dyn PositionLedger>,
    manager: Arc<PositionManager>,
    /// First time each locally-open token went missing externally.
    missing_since: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Reconciler {
    pub fn new(
        config: ReconcileConfig,
        ledger: Arc<dyn PositionLedger>,
        manager: Arc<PositionManager>,
    ) -> Self {
        Self {
            config,
            ledger,
            manager,
            missing_since: Mutex::new(HashMap::new()),
        }
    }

    /// Run one reconciliation pass against the given market universe.
    ///
    /// Idempotent: an unchanged external ledger produces no duplicate
    /// adoptions, because adoption goes through the registry's normal
    /// duplicate check.
    pub async fn reconcile(
        &self,
        markets: &[Market],
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, LedgerError> {
        let external = self.ledger.list_open_positions().await?;

        let mut market_by_token: HashMap<&str, (&Market, Outcome)> = HashMap::new();
        for market in markets {
            market_by_token.insert(&market.yes_token_id, (market, Outcome::Yes));
            market_by_token.insert(&market.no_token_id, (market, Outcome::No));
        }

        let mut report = ReconcileReport::default();

        // External -> local: adopt orphans.
        let mut external_tokens: Vec<&str> = Vec::with_capacity(external.len());
        for raw in &external {
            external_tokens.push(&raw.token_id);
            if raw.size < self.config.min_size {
                continue; // dust
            }
            let Some((market, side)) = market_by_token.get(raw.token_id.as_str()).copied() else {
                continue;
            };
            if self.manager.has_open(&market.market_id) {
                continue;
            }

            // Best-effort entry price: ledger average, else the current
            // mid for the held token, else an even-odds assumption.
            let entry_price = raw
                .avg_price
                .filter(|p| *p > Decimal::ZERO)
                .or_else(|| {
                    market.mid_price().map(|mid| match side {
                        Outcome::Yes => mid,
                        Outcome::No => Decimal::ONE - mid,
                    })
                })
                .unwrap_or(dec!(0.5));

            let confirmation = OrderConfirmation {
                order_id: format!("adopted-{}", raw.token_id),
                placed_price: entry_price,
                placed_at: now,
            };
            let mut position = Position::from_confirmed_order(
                market.market_id.clone(),
                market.question.clone(),
                edge_common::CryptoAsset::from_description(&market.question),
                side,
                raw.token_id.clone(),
                entry_price * raw.size,
                market.deadline,
                "ORPHAN".to_string(),
                confirmation,
            );
            position.shares = raw.size;

            match self.manager.adopt(position) {
                Ok(()) => {
                    warn!(
                        market_id = %market.market_id,
                        side = %side,
                        shares = %raw.size,
                        entry = %entry_price,
                        "orphan adopted into monitoring"
                    );
                    report.adopted.push(market.market_id.clone());
                }
                Err(e) => {
                    // Lost the race with a concurrent open; already tracked.
                    info!(market_id = %market.market_id, error = %e, "orphan already tracked");
                }
            }
        }

        // Local -> external: flag stale after the grace period.
        let grace = Duration::seconds(self.config.grace_secs);
        let open_tokens = self.manager.open_token_ids();
        let mut missing = self.missing_since.lock();
        for token in &open_tokens {
            if external_tokens.iter().any(|t| *t == token.as_str()) {
                missing.remove(token);
                continue;
            }
            let first_missing = *missing.entry(token.clone()).or_insert(now);
            if now - first_missing >= grace {
                warn!(
                    token_id = %token,
                    missing_for_secs = (now - first_missing).num_seconds(),
                    "local position absent from external ledger - operator attention required"
                );
                report.flagged_stale.push(token.clone());
            }
        }
        missing.retain(|token, _| open_tokens.contains(token));

        Ok(report)
    }
}
