//! Simulated exchange for paper trading.
//!
//! Generates synthetic 15-minute binary markets over a deterministic
//! random walk so the whole pipeline - scan, gate, entry, monitor,
//! exits, reconciliation - runs end-to-end without a live transport.
//! The external ledger is empty (paper fills are tracked locally).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use edge_common::CryptoAsset;

use crate::feed::{FeedError, MarketFeed};
use crate::position::reconcile::{ExternalPosition, LedgerError, PositionLedger};
use crate::types::{MarkPrice, Market, OrderBook, PriceLevel, PriceTick};

/// Small xorshift PRNG; deterministic for a given seed.
#[derive(Debug)]
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform value in [-1, 1] with 4 decimal places.
    fn unit(&mut self) -> Decimal {
        let raw = (self.next() % 20_001) as i64 - 10_000;
        Decimal::new(raw, 4)
    }
}

#[derive(Debug)]
struct SimAssetState {
    spot: Decimal,
    /// YES mid of the current window's market.
    mid: Decimal,
    history: Vec<PriceTick>,
    window_index: i64,
}

/// Synthetic market and spot data source.
pub struct SimExchange {
    assets: Vec<CryptoAsset>,
    state: Mutex<(XorShift, HashMap<CryptoAsset, SimAssetState>)>,
}

impl SimExchange {
    pub fn new(assets: Vec<CryptoAsset>, seed: u64) -> Self {
        Self {
            assets,
            state: Mutex::new((XorShift(seed.max(1)), HashMap::new())),
        }
    }

    fn base_spot(asset: CryptoAsset) -> Decimal {
        match asset {
            CryptoAsset::Btc => dec!(100000),
            CryptoAsset::Eth => dec!(3300),
            CryptoAsset::Sol => dec!(145),
            CryptoAsset::Xrp => dec!(0.60),
        }
    }

    fn window_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, i64) {
        let index = now.timestamp().div_euclid(900);
        let end = DateTime::from_timestamp((index + 1) * 900, 0).unwrap_or(now);
        (end, index)
    }

    /// Advance one asset's walk and return a cloned market for the
    /// current window.
    fn step(&self, asset: CryptoAsset, now: DateTime<Utc>) -> Market {
        let (deadline, window_index) = Self::window_bounds(now);
        let mut guard = self.state.lock();
        let (rng, states) = &mut *guard;

        let state = states.entry(asset).or_insert_with(|| SimAssetState {
            spot: Self::base_spot(asset),
            mid: dec!(0.50),
            history: Vec::new(),
            window_index,
        });

        if state.window_index != window_index {
            // New window: odds reset around even money.
            state.window_index = window_index;
            state.mid = dec!(0.50);
            state.history.clear();
        }

        // Spot drifts a few basis points per step; odds follow with noise.
        let drift = rng.unit() * dec!(0.0005);
        state.spot = (state.spot * (Decimal::ONE + drift)).round_dp(2);
        let odds_step = rng.unit() * dec!(0.01);
        state.mid = (state.mid + odds_step).clamp(dec!(0.05), dec!(0.95));
        let volume = dec!(10) + (rng.unit() + Decimal::ONE) * dec!(20);
        state.history.push(PriceTick {
            price: state.mid,
            volume,
            timestamp: now,
        });
        if state.history.len() > 120 {
            state.history.remove(0);
        }

        let market_id = format!("{}-{}", asset.as_str().to_lowercase(), window_index);
        let half_spread = dec!(0.01);
        let book = OrderBook {
            bids: vec![
                PriceLevel::new(state.mid - half_spread, dec!(800)),
                PriceLevel::new(state.mid - half_spread * Decimal::TWO, dec!(400)),
            ],
            asks: vec![
                PriceLevel::new(state.mid + half_spread, dec!(800)),
                PriceLevel::new(state.mid + half_spread * Decimal::TWO, dec!(400)),
            ],
            timestamp: Some(now),
        };

        Market {
            market_id: market_id.clone(),
            question: format!("{} Up or Down - 15 minute window", asset.as_str()),
            yes_token_id: format!("{market_id}-yes"),
            no_token_id: format!("{market_id}-no"),
            deadline,
            book: Some(book),
            no_book: None,
            price_history: state.history.clone(),
        }
    }

    fn token_mark(&self, token_id: &str) -> MarkPrice {
        let guard = self.state.lock();
        let (_, states) = &*guard;
        for (asset, state) in states.iter() {
            let prefix = asset.as_str().to_lowercase();
            if token_id.starts_with(&prefix) {
                let yes_mid = state.mid;
                let mid = if token_id.ends_with("-no") {
                    Decimal::ONE - yes_mid
                } else {
                    yes_mid
                };
                return MarkPrice {
                    last: Some(mid),
                    last_is_placeholder: false,
                    book_mid: Some(mid),
                };
            }
        }
        // Unknown token: placeholder only, as thin venues do.
        MarkPrice {
            last: Some(dec!(0.5)),
            last_is_placeholder: true,
            book_mid: None,
        }
    }
}

#[async_trait]
impl MarketFeed for SimExchange {
    async fn active_markets(&self) -> Result<Vec<Market>, FeedError> {
        let now = Utc::now();
        Ok(self
            .assets
            .iter()
            .map(|asset| self.step(*asset, now))
            .collect())
    }

    async fn mark_price(&self, token_id: &str) -> Result<MarkPrice, FeedError> {
        Ok(self.token_mark(token_id))
    }

    async fn spot_price(&self, asset: CryptoAsset) -> Result<Decimal, FeedError> {
        let guard = self.state.lock();
        let (_, states) = &*guard;
        Ok(states
            .get(&asset)
            .map(|s| s.spot)
            .unwrap_or_else(|| Self::base_spot(asset)))
    }

    async fn funding_rate(&self, _asset: CryptoAsset) -> Result<Decimal, FeedError> {
        let mut guard = self.state.lock();
        let (rng, _) = &mut *guard;
        Ok(rng.unit() * dec!(0.001))
    }
}

#[async_trait]
impl PositionLedger for SimExchange {
    async fn list_open_positions(&self) -> Result<Vec<ExternalPosition>, LedgerError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_markets_are_stable_within_a_window() {
        let sim = SimExchange::new(vec![CryptoAsset::Btc], 42);
        let first = sim.active_markets().await.unwrap();
        let second = sim.active_markets().await.unwrap();
        assert_eq!(first[0].market_id, second[0].market_id);
        assert_eq!(first[0].deadline, second[0].deadline);
        // History accumulates across steps.
        assert!(second[0].price_history.len() > first[0].price_history.len());
    }

    #[tokio::test]
    async fn test_mark_price_no_token_is_complement() {
        let sim = SimExchange::new(vec![CryptoAsset::Eth], 7);
        let markets = sim.active_markets().await.unwrap();
        let yes = sim.mark_price(&markets[0].yes_token_id).await.unwrap();
        let no = sim.mark_price(&markets[0].no_token_id).await.unwrap();
        assert_eq!(
            yes.last.unwrap() + no.last.unwrap(),
            Decimal::ONE
        );
    }

    #[tokio::test]
    async fn test_unknown_token_is_placeholder() {
        let sim = SimExchange::new(vec![CryptoAsset::Btc], 9);
        let mark = sim.mark_price("mystery-token").await.unwrap();
        assert!(mark.last_is_placeholder);
        assert!(mark.book_mid.is_none());
    }

    #[tokio::test]
    async fn test_walk_is_deterministic_per_seed() {
        let a = SimExchange::new(vec![CryptoAsset::Sol], 1234);
        let b = SimExchange::new(vec![CryptoAsset::Sol], 1234);
        let ma = a.active_markets().await.unwrap();
        let mb = b.active_markets().await.unwrap();
        assert_eq!(ma[0].mid_price(), mb[0].mid_price());
    }
}
