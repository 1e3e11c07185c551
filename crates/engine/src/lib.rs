//! Pivot level and technical-analysis engine.
//!
//! Pure, synchronous computations shared by every monitor: pivot ladders,
//! indicator series, momentum scoring, RSI divergence and level crossing
//! detection.

pub mod detector;
pub mod divergence;
pub mod indicators;
pub mod momentum;
pub mod pivot;
pub mod snapshot;

pub use detector::*;
pub use divergence::*;
pub use momentum::*;
pub use pivot::*;
pub use snapshot::*;
