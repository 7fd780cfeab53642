//! Core domain types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Supported cryptocurrency assets for 15-minute binary markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CryptoAsset {
    Btc,
    Eth,
    Sol,
    Xrp,
}

impl CryptoAsset {
    /// Returns the spot feed trading pair symbol (e.g., "btcusdt").
    pub fn feed_symbol(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "btcusdt",
            CryptoAsset::Eth => "ethusdt",
            CryptoAsset::Sol => "solusdt",
            CryptoAsset::Xrp => "xrpusdt",
        }
    }

    /// Returns the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CryptoAsset::Btc => "BTC",
            CryptoAsset::Eth => "ETH",
            CryptoAsset::Sol => "SOL",
            CryptoAsset::Xrp => "XRP",
        }
    }

    /// Keywords that identify this asset in market description text.
    ///
    /// Matching is ordered and case-insensitive; the first asset whose
    /// keyword appears wins. "eth" deliberately comes after "btc" checks
    /// so "Bitcoin or Ethereum?" style titles resolve to the leading asset.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            CryptoAsset::Btc => &["bitcoin", "btc"],
            CryptoAsset::Eth => &["ethereum", "eth"],
            CryptoAsset::Sol => &["solana", "sol"],
            CryptoAsset::Xrp => &["xrp", "ripple"],
        }
    }

    /// All supported assets, in resolution priority order.
    pub fn all() -> &'static [CryptoAsset] {
        &[
            CryptoAsset::Btc,
            CryptoAsset::Eth,
            CryptoAsset::Sol,
            CryptoAsset::Xrp,
        ]
    }

    /// Resolve the underlying asset from market description text.
    ///
    /// Deterministic keyword match; returns `None` for markets whose
    /// asset cannot be identified (callers should fall back to a
    /// conservative profile).
    pub fn from_description(text: &str) -> Option<CryptoAsset> {
        let lower = text.to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|asset| asset.keywords().iter().any(|kw| lower.contains(kw)))
    }
}

impl std::fmt::Display for CryptoAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CryptoAsset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BTC" | "BITCOIN" => Ok(CryptoAsset::Btc),
            "ETH" | "ETHEREUM" => Ok(CryptoAsset::Eth),
            "SOL" | "SOLANA" => Ok(CryptoAsset::Sol),
            "XRP" | "RIPPLE" => Ok(CryptoAsset::Xrp),
            _ => Err(format!("Unknown asset: {}", s)),
        }
    }
}

/// Outcome type for binary markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order side for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
