//! Price/RSI divergence over a short lookback window.

use crate::indicators::rsi;
use crate::snapshot::RSI_PERIOD;
use pivotbot_core::candle::closes;
use pivotbot_core::{Candle, DivergenceEvent, DivergenceKind};

pub const DEFAULT_DIVERGENCE_LOOKBACK: usize = 5;

const RSI_MIDPOINT: f64 = 50.0;

/// Detect divergence from a candle window, computing RSI(14) over it.
pub fn divergence_from_candles(candles: &[Candle], lookback: usize) -> Option<DivergenceEvent> {
    let close = closes(candles);
    let rsi_series = rsi(&close, RSI_PERIOD);
    detect_divergence(&close, &rsi_series, lookback)
}

/// Detect divergence between aligned close and RSI series.
///
/// Looks at the last `lookback` values. Bullish is checked first and at most
/// one event is returned.
pub fn detect_divergence(closes: &[f64], rsi: &[f64], lookback: usize) -> Option<DivergenceEvent> {
    if lookback == 0 || closes.len() < lookback + 1 || rsi.len() != closes.len() {
        return None;
    }

    let prices = &closes[closes.len() - lookback..];
    let rsis = &rsi[rsi.len() - lookback..];
    if prices.iter().chain(rsis).any(|v| !v.is_finite()) {
        return None;
    }

    let current_price = prices[lookback - 1];
    let current_rsi = rsis[lookback - 1];

    let price_low = arg_extreme(prices, |a, b| a < b);
    let rsi_low = arg_extreme(rsis, |a, b| a < b);
    if price_low < rsi_low
        && current_price > prices[price_low]
        && current_rsi > rsis[rsi_low]
        && current_rsi < RSI_MIDPOINT
    {
        return Some(DivergenceEvent {
            kind: DivergenceKind::Bullish,
            description: format!(
                "Price bottomed at {} before RSI bottomed at {:.1}; RSI recovering to {:.1}",
                prices[price_low], rsis[rsi_low], current_rsi
            ),
        });
    }

    let price_high = arg_extreme(prices, |a, b| a > b);
    let rsi_high = arg_extreme(rsis, |a, b| a > b);
    if price_high < rsi_high
        && current_price < prices[price_high]
        && current_rsi < rsis[rsi_high]
        && current_rsi > RSI_MIDPOINT
    {
        return Some(DivergenceEvent {
            kind: DivergenceKind::Bearish,
            description: format!(
                "Price topped at {} before RSI topped at {:.1}; RSI fading to {:.1}",
                prices[price_high], rsis[rsi_high], current_rsi
            ),
        });
    }

    None
}

/// Index of the first value that wins `better` against every other.
fn arg_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if better(*v, values[best]) {
            best = i;
        }
    }
    best
}
