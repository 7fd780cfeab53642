//! Append-only CSV journal of closed trades.
//!
//! One row per closed position: identity, prices, size, times, exit
//! reason, and the strategy profile that authorized the entry. The file
//! is the state surfaced to external observers (reports, dashboards).

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use edge_common::Outcome;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encode error: {0}")]
    Encode(#[from] csv::Error),
}

/// One closed trade, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub market_id: String,
    pub question: String,
    pub side: Outcome,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub stake: Decimal,
    pub shares: Decimal,
    pub pnl: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub exit_reason: String,
    pub strategy: String,
}

/// CSV-backed trade journal. Writes are serialized; a failed write is
/// logged and dropped rather than failing the exit that produced it.
#[derive(Debug)]
pub struct TradeJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TradeJournal {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a closed trade, writing the header on first use.
    pub fn append(&self, record: &TradeRecord) -> Result<(), JournalError> {
        let _guard = self.lock.lock();
        let write_header = !self.path.exists()
            || self.path.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Append, logging instead of propagating failure.
    pub fn append_or_warn(&self, record: &TradeRecord) {
        if let Err(e) = self.append(record) {
            warn!(error = %e, path = %self.path.display(), "trade journal write failed");
        }
    }
}
