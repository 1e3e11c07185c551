//! OHLCV candle data.

use serde::{Deserialize, Serialize};

/// One OHLCV candle as returned by the exchange, oldest first.
///
/// Price and volume fields may be `NaN` when the exchange returned a value
/// that could not be coerced to a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in milliseconds since epoch
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Close time in milliseconds since epoch
    pub close_time: i64,
}

impl Candle {
    /// Create a candle with an explicit close time.
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        }
    }

    /// Whether high, low and close are all usable numbers.
    pub fn has_finite_hlc(&self) -> bool {
        self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// The last guaranteed-closed candle of a window (second to last row).
pub fn closed_candle(candles: &[Candle]) -> Option<&Candle> {
    candles.len().checked_sub(2).and_then(|i| candles.get(i))
}

/// The in-progress candle of a window (last row).
pub fn live_candle(candles: &[Candle]) -> Option<&Candle> {
    candles.last()
}

/// Column accessors used by the indicator functions.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

pub fn highs(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.high).collect()
}

pub fn lows(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.low).collect()
}

pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}
