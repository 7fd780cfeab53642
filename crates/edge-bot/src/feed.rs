//! Collaborator interfaces for market data and external catalyst flags.
//!
//! The raw exchange transport (HTTP/WebSocket, rate limiting, retries,
//! auth) lives behind these traits. Transient failures are the
//! collaborator's problem to retry; an exhausted retry surfaces here as
//! an ordinary `Err` and the engine treats it as "no data this cycle".

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use edge_common::{CryptoAsset, Outcome};

use crate::state::CatalystFlag;
use crate::types::{MarkPrice, Market};

/// Errors surfaced by market data collaborators.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unavailable: {0}")]
    Unavailable(String),

    #[error("malformed feed payload: {0}")]
    Malformed(String),
}

/// Market and spot data source.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Active 15-minute markets, with order books and recent history.
    async fn active_markets(&self) -> Result<Vec<Market>, FeedError>;

    /// Current mark for a token (last trade + book mid).
    async fn mark_price(&self, token_id: &str) -> Result<MarkPrice, FeedError>;

    /// Latest spot price for an asset.
    async fn spot_price(&self, asset: CryptoAsset) -> Result<Decimal, FeedError>;

    /// Current funding rate for an asset. Callers cache this - the
    /// source only updates a few times a day.
    async fn funding_rate(&self, asset: CryptoAsset) -> Result<Decimal, FeedError>;
}

/// Source of external catalyst overrides, polled periodically.
#[async_trait]
pub trait CatalystSource: Send + Sync {
    /// Poll for a newly supplied flag; `None` when nothing is pending.
    async fn poll(&self) -> Result<Option<CatalystFlag>, FeedError>;
}

/// Wire format of the catalyst flag file.
#[derive(Debug, Deserialize)]
struct RawCatalystFlag {
    asset: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    reason: String,
}

/// File-polling catalyst source (`catalyst_flag.json`).
///
/// A modified file is picked up on the next poll; the expiry window is
/// stamped at pickup time. Clearing on expiry belongs to the evaluator
/// that checks the flag, never to this watcher.
#[derive(Debug)]
pub struct JsonFileCatalystSource {
    path: PathBuf,
    expiry: Duration,
    last_modified: parking_lot::Mutex<Option<std::time::SystemTime>>,
}

impl JsonFileCatalystSource {
    pub fn new(path: PathBuf, expiry: Duration) -> Self {
        Self {
            path,
            expiry,
            last_modified: parking_lot::Mutex::new(None),
        }
    }

    fn parse(&self, text: &str, now: DateTime<Utc>) -> Result<CatalystFlag, FeedError> {
        let raw: RawCatalystFlag =
            serde_json::from_str(text).map_err(|e| FeedError::Malformed(e.to_string()))?;
        let asset: CryptoAsset = raw
            .asset
            .parse()
            .map_err(|e: String| FeedError::Malformed(e))?;
        let direction = match raw.direction.as_deref() {
            Some(d) if d.eq_ignore_ascii_case("down") => Outcome::No,
            _ => Outcome::Yes,
        };
        Ok(CatalystFlag {
            asset,
            direction,
            reason: raw.reason,
            set_at: now,
            expires_at: now + self.expiry,
        })
    }
}

#[async_trait]
impl CatalystSource for JsonFileCatalystSource {
    async fn poll(&self) -> Result<Option<CatalystFlag>, FeedError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        let modified = metadata
            .modified()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        {
            let mut last = self.last_modified.lock();
            if *last == Some(modified) {
                return Ok(None);
            }
            *last = Some(modified);
        }

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;
        let flag = self.parse(&text, Utc::now())?;
        debug!(asset = %flag.asset, direction = %flag.direction, "catalyst flag picked up");
        Ok(Some(flag))
    }
}
