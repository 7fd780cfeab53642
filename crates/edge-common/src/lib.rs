//! Shared domain types for the edge-bot trading engine.
//!
//! Asset identity, binary outcomes, and order sides. Anything carrying
//! a price or quantity lives in `edge-bot` and uses
//! `rust_decimal::Decimal` - never f64 for financial math.

pub mod types;

pub use types::{CryptoAsset, Outcome, Side};
