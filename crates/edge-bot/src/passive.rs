//! Passive (maker) quoting during quiet hours.
//!
//! For eligible assets with quiet books, place a paired limit bid on
//! both outcomes around the mid and collect the spread. Pair records
//! expire after a TTL; a sudden move cancels both legs. Single-sided
//! fills are exactly what reconciliation later adopts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use edge_common::{CryptoAsset, Outcome, Side};

use crate::config::PassiveConfig;
use crate::executor::{place_with_timeout, Executor, OrderRequest};
use crate::position::manager::PositionManager;
use crate::strategy::router::EligibilityWindow;
use crate::types::Market;

/// A resting maker pair.
#[derive(Debug, Clone)]
struct MakerPair {
    yes_order_id: String,
    no_order_id: String,
    placed_at: DateTime<Utc>,
    mid_at_placement: Decimal,
}

/// Reason a market was skipped for passive quoting this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassiveSkip {
    AssetNotEligible,
    HasPosition,
    PairOutstanding,
    BookNotReady,
    BookNotQuiet,
    LegFailed,
}

/// Places and maintains paired maker quotes.
pub struct PassiveQuoter {
    config: PassiveConfig,
    window: EligibilityWindow,
    executor: Arc<dyn Executor>,
    order_timeout: std::time::Duration,
    pairs: Mutex<HashMap<String, MakerPair>>,
}

impl PassiveQuoter {
    pub fn new(
        config: PassiveConfig,
        executor: Arc<dyn Executor>,
        order_timeout: std::time::Duration,
    ) -> Self {
        let window = EligibilityWindow {
            start_hour: config.hours_start,
            end_hour: config.hours_end,
        };
        Self {
            config,
            window,
            executor,
            order_timeout,
            pairs: Mutex::new(HashMap::new()),
        }
    }

    pub fn active(&self, now: DateTime<Utc>) -> bool {
        self.config.enabled && self.window.contains(now)
    }

    pub fn outstanding_pairs(&self) -> usize {
        self.pairs.lock().len()
    }

    /// One maintenance pass: expire old records, kill pairs on sudden
    /// moves, and quote eligible quiet markets.
    pub async fn tick(
        &self,
        markets: &[Market],
        positions: &PositionManager,
        now: DateTime<Utc>,
    ) {
        if !self.active(now) {
            return;
        }

        self.expire_pairs(now);
        self.volatility_kill(markets).await;

        for market in markets {
            match self.quote_market(market, positions, now).await {
                Ok(()) => {}
                Err(skip) => {
                    debug!(market_id = %market.market_id, reason = ?skip, "passive skip")
                }
            }
        }
    }

    fn expire_pairs(&self, now: DateTime<Utc>) {
        let ttl = Duration::seconds(self.config.pair_ttl_secs);
        self.pairs.lock().retain(|market_id, pair| {
            let keep = now - pair.placed_at < ttl;
            if !keep {
                debug!(market_id = %market_id, "maker pair record expired");
            }
            keep
        });
    }

    /// Cancel both legs of any pair whose market moved too far since
    /// placement.
    async fn volatility_kill(&self, markets: &[Market]) {
        let to_kill: Vec<(String, MakerPair)> = {
            let pairs = self.pairs.lock();
            markets
                .iter()
                .filter_map(|m| {
                    let pair = pairs.get(&m.market_id)?;
                    let mid = m.mid_price()?;
                    let moved = (mid - pair.mid_at_placement).abs();
                    (moved >= self.config.volatility_kill)
                        .then(|| (m.market_id.clone(), pair.clone()))
                })
                .collect()
        };

        for (market_id, pair) in to_kill {
            warn!(market_id = %market_id, "volatility kill: cancelling maker pair");
            for order_id in [&pair.yes_order_id, &pair.no_order_id] {
                if let Err(e) = self.executor.cancel_order(order_id).await {
                    warn!(order_id = %order_id, error = %e, "maker cancel failed");
                }
            }
            self.pairs.lock().remove(&market_id);
        }
    }

    async fn quote_market(
        &self,
        market: &Market,
        positions: &PositionManager,
        now: DateTime<Utc>,
    ) -> Result<(), PassiveSkip> {
        let asset = CryptoAsset::from_description(&market.question);
        if !asset.is_some_and(|a| self.config.assets.contains(&a)) {
            return Err(PassiveSkip::AssetNotEligible);
        }
        if positions.has_open(&market.market_id) {
            return Err(PassiveSkip::HasPosition);
        }
        if self.pairs.lock().contains_key(&market.market_id) {
            return Err(PassiveSkip::PairOutstanding);
        }
        let mid = market.mid_price().ok_or(PassiveSkip::BookNotReady)?;
        if mid <= Decimal::ZERO || mid >= Decimal::ONE {
            return Err(PassiveSkip::BookNotReady);
        }
        if !self.book_is_quiet(market) {
            return Err(PassiveSkip::BookNotQuiet);
        }

        let half = self.config.spread_target / Decimal::TWO;
        let yes_price = (mid - half).max(dec!(0.01)).round_dp(4);
        let no_price = ((Decimal::ONE - mid) - half).max(dec!(0.01)).round_dp(4);
        let yes_shares = (self.config.max_position / yes_price).round_dp(4);
        let no_shares = (self.config.max_position / no_price).round_dp(4);

        let yes_request = OrderRequest::new(
            &market.market_id,
            &market.yes_token_id,
            Outcome::Yes,
            Side::Buy,
            yes_price,
            yes_shares,
        );
        let yes_confirmation =
            place_with_timeout(self.executor.as_ref(), &yes_request, self.order_timeout)
                .await
                .map_err(|e| {
                    warn!(market_id = %market.market_id, error = %e, "maker YES leg failed");
                    PassiveSkip::LegFailed
                })?;

        let no_request = OrderRequest::new(
            &market.market_id,
            &market.no_token_id,
            Outcome::No,
            Side::Buy,
            no_price,
            no_shares,
        );
        let no_confirmation =
            match place_with_timeout(self.executor.as_ref(), &no_request, self.order_timeout).await
            {
                Ok(confirmation) => confirmation,
                Err(e) => {
                    // Leg risk: never leave a single-sided resting quote.
                    warn!(
                        market_id = %market.market_id,
                        error = %e,
                        "maker NO leg failed - cancelling YES leg"
                    );
                    if let Err(cancel_err) =
                        self.executor.cancel_order(&yes_confirmation.order_id).await
                    {
                        warn!(
                            order_id = %yes_confirmation.order_id,
                            error = %cancel_err,
                            "orphaned YES leg cancel failed - reconciliation will adopt any fill"
                        );
                    }
                    return Ok(());
                }
            };

        info!(
            market_id = %market.market_id,
            yes_price = %yes_price,
            no_price = %no_price,
            size = %self.config.max_position,
            "maker pair placed"
        );
        self.pairs.lock().insert(
            market.market_id.clone(),
            MakerPair {
                yes_order_id: yes_confirmation.order_id,
                no_order_id: no_confirmation.order_id,
                placed_at: now,
                mid_at_placement: mid,
            },
        );
        Ok(())
    }

    /// Quiet book: stddev of the last 10 tick prices below the
    /// configured bound. Compared as variances to stay in exact
    /// decimal arithmetic.
    fn book_is_quiet(&self, market: &Market) -> bool {
        let prices: Vec<Decimal> = market
            .price_history
            .iter()
            .rev()
            .take(10)
            .map(|t| t.price)
            .collect();
        if prices.len() < 10 {
            return false;
        }
        let n = Decimal::from(prices.len() as u32);
        let mean = prices.iter().copied().sum::<Decimal>() / n;
        let variance = prices
            .iter()
            .map(|p| (*p - mean) * (*p - mean))
            .sum::<Decimal>()
            / n;
        variance < self.config.max_tick_stddev * self.config.max_tick_stddev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositionConfig;
    use crate::executor::PaperExecutor;
    use crate::feed::{FeedError, MarketFeed};
    use crate::journal::TradeJournal;
    use crate::risk::RiskLedger;
    use crate::types::{MarkPrice, OrderBook, PriceLevel, PriceTick};
    use async_trait::async_trait;
    use chrono::Timelike;

    struct NullFeed;

    #[async_trait]
    impl MarketFeed for NullFeed {
        async fn active_markets(&self) -> Result<Vec<Market>, FeedError> {
            Ok(vec![])
        }

        async fn mark_price(&self, _token_id: &str) -> Result<MarkPrice, FeedError> {
            Ok(MarkPrice::default())
        }

        async fn spot_price(&self, _asset: CryptoAsset) -> Result<Decimal, FeedError> {
            Err(FeedError::Unavailable("null".into()))
        }

        async fn funding_rate(&self, _asset: CryptoAsset) -> Result<Decimal, FeedError> {
            Err(FeedError::Unavailable("null".into()))
        }
    }

    fn positions() -> (PositionManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = PositionManager::new(
            PositionConfig::default(),
            std::time::Duration::from_secs(1),
            Arc::new(NullFeed),
            Arc::new(PaperExecutor::default()),
            Arc::new(RiskLedger::new()),
            Arc::new(TradeJournal::new(dir.path().join("trades.csv"))),
        );
        (manager, dir)
    }

    fn quiet_market(question: &str, mid: Decimal) -> Market {
        let now = Utc::now();
        Market {
            market_id: question.to_lowercase().replace(' ', "-"),
            question: question.to_string(),
            yes_token_id: "y".into(),
            no_token_id: "n".into(),
            deadline: now + Duration::minutes(10),
            book: Some(OrderBook {
                bids: vec![PriceLevel::new(mid - dec!(0.01), dec!(500))],
                asks: vec![PriceLevel::new(mid + dec!(0.01), dec!(500))],
                timestamp: Some(now),
            }),
            no_book: None,
            price_history: (0..12)
                .map(|_| PriceTick {
                    price: mid,
                    volume: dec!(5),
                    timestamp: now,
                })
                .collect(),
        }
    }

    fn always_on_config() -> PassiveConfig {
        // Window spanning the whole day so tests run at any hour.
        let mut config = PassiveConfig::default();
        config.hours_start = Utc::now().hour();
        config.hours_end = (Utc::now().hour() + 1) % 24;
        config
    }

    fn quoter(config: PassiveConfig) -> PassiveQuoter {
        PassiveQuoter::new(
            config,
            Arc::new(PaperExecutor::default()),
            std::time::Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_quiet_eligible_market_gets_pair() {
        let (positions, _dir) = positions();
        let quoter = quoter(always_on_config());
        let markets = vec![quiet_market("Bitcoin Up or Down?", dec!(0.50))];

        quoter.tick(&markets, &positions, Utc::now()).await;
        assert_eq!(quoter.outstanding_pairs(), 1);

        // Second tick does not double-quote.
        quoter.tick(&markets, &positions, Utc::now()).await;
        assert_eq!(quoter.outstanding_pairs(), 1);
    }

    #[tokio::test]
    async fn test_noisy_market_not_quoted() {
        let (positions, _dir) = positions();
        let quoter = quoter(always_on_config());
        let mut market = quiet_market("Bitcoin Up or Down?", dec!(0.50));
        for (i, tick) in market.price_history.iter_mut().enumerate() {
            tick.price = if i % 2 == 0 { dec!(0.45) } else { dec!(0.55) };
        }

        quoter.tick(&[market], &positions, Utc::now()).await;
        assert_eq!(quoter.outstanding_pairs(), 0);
    }

    #[tokio::test]
    async fn test_ineligible_asset_not_quoted() {
        let (positions, _dir) = positions();
        let quoter = quoter(always_on_config());
        let markets = vec![quiet_market("XRP Up or Down?", dec!(0.50))];

        quoter.tick(&markets, &positions, Utc::now()).await;
        assert_eq!(quoter.outstanding_pairs(), 0);
    }

    #[tokio::test]
    async fn test_outside_hours_inactive() {
        let mut config = PassiveConfig::default();
        // A one-hour window that is definitely not "now".
        config.hours_start = (Utc::now().hour() + 2) % 24;
        config.hours_end = (Utc::now().hour() + 3) % 24;
        let quoter = quoter(config);
        assert!(!quoter.active(Utc::now()));
    }

    #[tokio::test]
    async fn test_pair_records_expire() {
        let (positions, _dir) = positions();
        let mut config = always_on_config();
        config.pair_ttl_secs = 300;
        let quoter = quoter(config);
        let markets = vec![quiet_market("Bitcoin Up or Down?", dec!(0.50))];

        let now = Utc::now();
        quoter.tick(&markets, &positions, now).await;
        assert_eq!(quoter.outstanding_pairs(), 1);

        quoter.expire_pairs(now + Duration::seconds(301));
        assert_eq!(quoter.outstanding_pairs(), 0);
    }

    #[tokio::test]
    async fn test_volatility_kill_cancels_pair() {
        let (positions, _dir) = positions();
        let quoter = quoter(always_on_config());
        let mut markets = vec![quiet_market("Bitcoin Up or Down?", dec!(0.50))];

        quoter.tick(&markets, &positions, Utc::now()).await;
        assert_eq!(quoter.outstanding_pairs(), 1);

        // Mid jumps 0.01 -> beyond the 0.008 kill threshold.
        markets[0].book = Some(OrderBook {
            bids: vec![PriceLevel::new(dec!(0.50), dec!(500))],
            asks: vec![PriceLevel::new(dec!(0.52), dec!(500))],
            timestamp: None,
        });
        quoter.volatility_kill(&markets).await;
        assert_eq!(quoter.outstanding_pairs(), 0);
    }
}
