//! Trade-gate strategy logic.
//!
//! - `signals`: base market signals (book imbalance, momentum, volume)
//! - `specials`: asset-specific strategy signals with kill switches
//! - `router`: asset -> profile dispatch (weights, thresholds, windows)
//! - `edge`: the consensus/sizing evaluator producing an `EdgeVerdict`

pub mod edge;
pub mod router;
pub mod signals;
pub mod specials;

pub use edge::{EdgeEvaluator, EdgeVerdict, GateRejection};
pub use router::{AssetProfile, EligibilityWindow, RoutedMarket, StrategyKind, StrategyRouter};
pub use signals::{SignalName, SignalOutcome, SignalReading};
