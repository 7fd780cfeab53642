//! Market data types: order books, price ticks, and tradable markets.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use edge_common::Outcome;

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Notional value of this level (price * size).
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Order book for one token, bids and asks sorted best-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Midpoint of best bid and ask, if both sides are present.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Notional bid depth through the top `levels` price levels.
    pub fn bid_depth(&self, levels: usize) -> Decimal {
        self.bids.iter().take(levels).map(|l| l.notional()).sum()
    }

    /// Notional ask depth through the top `levels` price levels.
    pub fn ask_depth(&self, levels: usize) -> Decimal {
        self.asks.iter().take(levels).map(|l| l.notional()).sum()
    }

    /// Total notional depth on both sides.
    pub fn total_depth(&self) -> Decimal {
        self.bid_depth(usize::MAX) + self.ask_depth(usize::MAX)
    }
}

/// One trade tick on a market token (price + volume at a timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A tradable 15-minute binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Unique market identifier (one open position per market).
    pub market_id: String,
    /// Human-readable market question.
    pub question: String,
    /// Token id for the YES outcome.
    pub yes_token_id: String,
    /// Token id for the NO outcome.
    pub no_token_id: String,
    /// Market resolution deadline.
    pub deadline: DateTime<Utc>,
    /// YES-token order book, if available.
    pub book: Option<OrderBook>,
    /// NO-token order book, for imbalance cross-checks.
    pub no_book: Option<OrderBook>,
    /// Recent trade ticks on the YES token (often sparse for 15-min markets).
    pub price_history: Vec<PriceTick>,
}

impl Market {
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.deadline - now).num_seconds()
    }

    /// Minutes elapsed since the window opened (windows are 15 minutes).
    pub fn minutes_into_window(&self, now: DateTime<Utc>) -> i64 {
        let window_start = self.deadline - chrono::Duration::minutes(15);
        (now - window_start).num_minutes()
    }

    pub fn token_for(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.yes_token_id,
            Outcome::No => &self.no_token_id,
        }
    }

    /// YES mid price, if the book allows one.
    pub fn mid_price(&self) -> Option<Decimal> {
        self.book.as_ref().and_then(|b| b.mid_price())
    }

    pub fn total_depth(&self) -> Decimal {
        self.book
            .as_ref()
            .map(|b| b.total_depth())
            .unwrap_or(Decimal::ZERO)
    }
}

/// Current mark for a token, as reported by the feed.
///
/// Thin markets may report a placeholder last-trade value; the monitor
/// must not use a placeholder for stop-loss/take-profit comparisons and
/// should prefer the liquidity-derived `book_mid` instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkPrice {
    /// Last trade price, if any.
    pub last: Option<Decimal>,
    /// True when `last` is a default placeholder (no recent trade).
    pub last_is_placeholder: bool,
    /// Mid price derived from the token's order book.
    pub book_mid: Option<Decimal>,
}

impl MarkPrice {
    /// The price usable for exit comparisons, preferring a real last
    /// trade over a book-derived mid. Returns `None` when neither is
    /// trustworthy.
    pub fn reliable(&self) -> Option<Decimal> {
        match self.last {
            Some(p) if !self.last_is_placeholder => Some(p),
            _ => self.book_mid,
        }
    }

    /// True when the feed only had an untrustworthy placeholder to offer.
    pub fn placeholder_only(&self) -> bool {
        self.last_is_placeholder && self.book_mid.is_none()
    }
}
