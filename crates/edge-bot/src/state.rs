//! Shared state for the trading engine.
//!
//! Each field has exactly one writer role:
//! - the feed-refresh loop writes telemetry,
//! - the scan loop writes the broadcast signal,
//! - the catalyst watcher writes the catalyst flag (the evaluator that
//!   checks it is the only component allowed to clear it),
//! - the shutdown path writes control flags.
//!
//! Evaluators only ever read cloned snapshots, so no evaluation can
//! mutate telemetry mid-flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use edge_common::{CryptoAsset, Outcome};

/// One spot price observation.
#[derive(Debug, Clone, Copy)]
pub struct SpotTick {
    pub price: Decimal,
    pub at: DateTime<Utc>,
}

/// Spot price captured at the open of the current 15-minute window.
#[derive(Debug, Clone, Copy)]
pub struct WindowOpen {
    pub price: Decimal,
    pub opened_at: DateTime<Utc>,
}

/// Cached funding rate with a freshness timestamp.
///
/// The upstream source only updates a few times a day, so the cache is
/// refreshed on a multi-minute cadence rather than per evaluation.
#[derive(Debug, Clone, Copy)]
pub struct FundingSample {
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Rolling telemetry for a single asset.
#[derive(Debug, Default)]
pub struct AssetTelemetry {
    ticks: VecDeque<SpotTick>,
    window_open: Option<WindowOpen>,
    funding: Option<FundingSample>,
}

/// Read-only view of one asset's telemetry at a point in time.
///
/// Cloned out of the store so signal evaluation is side-effect-free
/// over the snapshot.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub spot: Option<Decimal>,
    pub window_open_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub recent_prices: Vec<Decimal>,
}

impl TelemetrySnapshot {
    /// Percentage move of spot from the window-open reference price.
    pub fn pct_move_from_open(&self) -> Option<Decimal> {
        match (self.spot, self.window_open_price) {
            (Some(spot), Some(open)) if open > Decimal::ZERO => Some((spot - open) / open),
            _ => None,
        }
    }
}

/// Per-asset telemetry store. Written only by the feed-refresh loop.
#[derive(Debug)]
pub struct TelemetryStore {
    inner: DashMap<CryptoAsset, AssetTelemetry>,
    capacity: usize,
}

/// 15-minute window index for a timestamp. Two timestamps share a
/// window iff this value matches.
fn window_index(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(900)
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: DashMap::new(),
            capacity,
        }
    }

    /// Record a spot tick, rolling the window-open reference when the
    /// tick crosses a 15-minute boundary.
    pub fn record_tick(&self, asset: CryptoAsset, price: Decimal, at: DateTime<Utc>) {
        let mut entry = self.inner.entry(asset).or_default();

        let rolled = match entry.window_open {
            Some(open) => window_index(open.opened_at) != window_index(at),
            None => true,
        };
        if rolled {
            debug!(asset = %asset, price = %price, "window open price reset");
            entry.window_open = Some(WindowOpen {
                price,
                opened_at: at,
            });
        }

        entry.ticks.push_back(SpotTick { price, at });
        while entry.ticks.len() > self.capacity {
            entry.ticks.pop_front();
        }
    }

    /// True when the funding cache for `asset` is missing or older than `ttl`.
    pub fn funding_stale(&self, asset: CryptoAsset, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.inner.get(&asset).and_then(|e| e.funding) {
            Some(sample) => now - sample.fetched_at > ttl,
            None => true,
        }
    }

    pub fn store_funding(&self, asset: CryptoAsset, rate: Decimal, now: DateTime<Utc>) {
        let mut entry = self.inner.entry(asset).or_default();
        entry.funding = Some(FundingSample {
            rate,
            fetched_at: now,
        });
    }

    /// Clone out a read-only snapshot for evaluation.
    pub fn snapshot(&self, asset: CryptoAsset) -> TelemetrySnapshot {
        match self.inner.get(&asset) {
            Some(entry) => TelemetrySnapshot {
                spot: entry.ticks.back().map(|t| t.price),
                window_open_price: entry.window_open.map(|w| w.price),
                funding_rate: entry.funding.map(|f| f.rate),
                recent_prices: entry.ticks.iter().map(|t| t.price).collect(),
            },
            None => TelemetrySnapshot::default(),
        }
    }
}

/// A directional signal broadcast by the anchor asset's evaluation,
/// consumed (time-gated) by dependent assets.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSignal {
    pub asset: CryptoAsset,
    pub direction: Outcome,
    pub magnitude: Decimal,
    pub fired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Holder for the current broadcast signal.
///
/// Expiry is time-based, not a lock: `active()` re-verifies the
/// timestamp on every read, so a stale entry can never influence a
/// later decision regardless of task interleaving.
#[derive(Debug, Default)]
pub struct BroadcastState {
    inner: RwLock<Option<BroadcastSignal>>,
}

impl BroadcastState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, signal: BroadcastSignal) {
        debug!(
            asset = %signal.asset,
            direction = %signal.direction,
            magnitude = %signal.magnitude,
            "broadcast signal published"
        );
        *self.inner.write() = Some(signal);
    }

    /// Current signal if it has not expired; lazily clears stale entries.
    pub fn active(&self, now: DateTime<Utc>) -> Option<BroadcastSignal> {
        let current = *self.inner.read();
        match current {
            Some(sig) if now < sig.expires_at => Some(sig),
            Some(_) => {
                *self.inner.write() = None;
                None
            }
            None => None,
        }
    }
}

/// Externally supplied catalyst override for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalystFlag {
    pub asset: CryptoAsset,
    pub direction: Outcome,
    pub reason: String,
    pub set_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Holder for the catalyst flag.
///
/// The watcher task sets it; the evaluator that checks it owns the
/// clear-on-expiry. No other caller may clear it.
#[derive(Debug, Default)]
pub struct CatalystStore {
    inner: RwLock<Option<CatalystFlag>>,
}

impl CatalystStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, flag: CatalystFlag) {
        *self.inner.write() = Some(flag);
    }

    /// Return the active flag for `asset`, clearing it when expired.
    pub fn check(&self, asset: CryptoAsset, now: DateTime<Utc>) -> Option<CatalystFlag> {
        let current = self.inner.read().clone();
        let flag = current?;
        if now >= flag.expires_at {
            warn!(asset = %flag.asset, "catalyst expired - flag cleared");
            *self.inner.write() = None;
            return None;
        }
        if flag.asset != asset {
            return None;
        }
        Some(flag)
    }
}

/// Process-wide control flags.
#[derive(Debug, Default)]
pub struct ControlFlags {
    shutdown_requested: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}
