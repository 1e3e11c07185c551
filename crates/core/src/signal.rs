//! Point-in-time technical signals. Derived every poll, never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest indicator values over a candle window.
///
/// Values that could not be computed hold their neutral default
/// (RSI and MFI 50, everything else 0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub atr: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub mfi: f64,
    pub adx: f64,
    pub volume_sma: f64,
    pub volume_ratio: f64,
    pub price: f64,
    pub prev_rsi: f64,
    pub prev_price: f64,
}

/// Momentum classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentumLabel {
    StrongBull,
    Bull,
    Neutral,
    Bear,
    StrongBear,
}

impl MomentumLabel {
    /// Classify a total momentum score.
    pub fn from_score(score: i32) -> Self {
        if score >= 8 {
            MomentumLabel::StrongBull
        } else if score >= 4 {
            MomentumLabel::Bull
        } else if score >= -3 {
            MomentumLabel::Neutral
        } else if score >= -7 {
            MomentumLabel::Bear
        } else {
            MomentumLabel::StrongBear
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MomentumLabel::StrongBull => "STRONG_BULL",
            MomentumLabel::Bull => "BULL",
            MomentumLabel::Neutral => "NEUTRAL",
            MomentumLabel::Bear => "BEAR",
            MomentumLabel::StrongBear => "STRONG_BEAR",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            MomentumLabel::StrongBull => "🚀",
            MomentumLabel::Bull => "🟢",
            MomentumLabel::Neutral => "⚪",
            MomentumLabel::Bear => "🔴",
            MomentumLabel::StrongBear => "🩸",
        }
    }
}

impl fmt::Display for MomentumLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Momentum label, score and the reasons that produced it, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignal {
    pub label: MomentumLabel,
    pub score: i32,
    pub reasons: Vec<String>,
}

impl MomentumSignal {
    pub fn emoji(&self) -> &'static str {
        self.label.emoji()
    }

    /// The first `n` reasons, as surfaced in alert messages.
    pub fn top_reasons(&self, n: usize) -> &[String] {
        &self.reasons[..self.reasons.len().min(n)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceKind {
    Bullish,
    Bearish,
}

impl fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceKind::Bullish => f.write_str("BULLISH"),
            DivergenceKind::Bearish => f.write_str("BEARISH"),
        }
    }
}

/// Price/RSI divergence found over the lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceEvent {
    pub kind: DivergenceKind,
    pub description: String,
}
