//! Indicator snapshot over a candle window.

use crate::indicators::{adx, atr, bollinger, last_or, macd, mfi, nth_back_or, rsi, sma};
use pivotbot_core::candle::{closes, highs, lows, volumes};
use pivotbot_core::{Candle, IndicatorSnapshot};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD: f64 = 2.0;
pub const ATR_PERIOD: usize = 14;
pub const SMA_FAST: usize = 50;
pub const SMA_SLOW: usize = 200;
pub const VOLUME_SMA_PERIOD: usize = 20;
pub const MFI_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;

/// Neutral reading for bounded oscillators (RSI, MFI).
const NEUTRAL_OSCILLATOR: f64 = 50.0;

/// Compute every indicator over `candles` (oldest first) and keep the latest values.
///
/// Indicators without enough history fall back to their neutral default, so
/// this never fails, even for an empty window.
pub fn compute_snapshot(candles: &[Candle]) -> IndicatorSnapshot {
    let close = closes(candles);
    let high = highs(candles);
    let low = lows(candles);
    let volume = volumes(candles);

    let rsi_series = rsi(&close, RSI_PERIOD);
    let macd_result = macd(&close, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let bands = bollinger(&close, BOLLINGER_PERIOD, BOLLINGER_STD);
    let volume_sma = last_or(&sma(&volume, VOLUME_SMA_PERIOD), 0.0);
    let live_volume = last_or(&volume, 0.0);

    let volume_ratio = if volume_sma > 0.0 {
        live_volume / volume_sma
    } else {
        1.0
    };

    IndicatorSnapshot {
        rsi: last_or(&rsi_series, NEUTRAL_OSCILLATOR),
        macd: last_or(&macd_result.macd_line, 0.0),
        macd_signal: last_or(&macd_result.signal_line, 0.0),
        macd_hist: last_or(&macd_result.histogram, 0.0),
        atr: last_or(&atr(&high, &low, &close, ATR_PERIOD), 0.0),
        sma_50: last_or(&sma(&close, SMA_FAST), 0.0),
        sma_200: last_or(&sma(&close, SMA_SLOW), 0.0),
        bb_upper: last_or(&bands.upper, 0.0),
        bb_middle: last_or(&bands.middle, 0.0),
        bb_lower: last_or(&bands.lower, 0.0),
        mfi: last_or(&mfi(&high, &low, &close, &volume, MFI_PERIOD), NEUTRAL_OSCILLATOR),
        adx: last_or(&adx(&high, &low, &close, ADX_PERIOD), 0.0),
        volume_sma,
        volume_ratio,
        price: last_or(&close, 0.0),
        prev_rsi: nth_back_or(&rsi_series, 1, NEUTRAL_OSCILLATOR),
        prev_price: nth_back_or(&close, 1, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::momentum::momentum_signal;

    fn trending(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + step * i as f64;
                let open_time = i as i64 * 60_000;
                Candle::new(open_time, c, c + 1.0, c - 1.0, c, 10.0, open_time + 59_999)
            })
            .collect()
    }

    #[test]
    fn test_empty_window_uses_neutral_defaults() {
        let snap = compute_snapshot(&[]);
        assert_eq!(snap.rsi, 50.0);
        assert_eq!(snap.mfi, 50.0);
        assert_eq!(snap.prev_rsi, 50.0);
        assert_eq!(snap.macd, 0.0);
        assert_eq!(snap.atr, 0.0);
        assert_eq!(snap.sma_200, 0.0);
        assert_eq!(snap.price, 0.0);
        assert_eq!(snap.volume_ratio, 1.0);
    }

    #[test]
    fn test_short_window_partial_defaults() {
        let snap = compute_snapshot(&trending(30, 1.0));
        assert_eq!(snap.price, 129.0);
        assert_eq!(snap.prev_price, 128.0);
        assert!(snap.rsi > 50.0);
        assert!(snap.atr > 0.0);
        // not enough history for the long averages
        assert_eq!(snap.sma_50, 0.0);
        assert_eq!(snap.sma_200, 0.0);
        assert_eq!(snap.macd_signal, 0.0);
    }

    #[test]
    fn test_full_window() {
        let snap = compute_snapshot(&trending(250, 1.0));
        assert_eq!(snap.price, 349.0);
        assert!(snap.sma_50 > snap.sma_200);
        assert!(snap.price > snap.sma_50);
        assert!(snap.macd > 0.0);
        assert!((snap.volume_ratio - 1.0).abs() < 1e-9);
        assert!((snap.volume_sma - 10.0).abs() < 1e-9);
        assert!(snap.bb_upper > snap.bb_middle && snap.bb_middle > snap.bb_lower);
    }

    #[test]
    fn test_volume_spike_ratio() {
        let mut candles = trending(40, 0.0);
        if let Some(last) = candles.last_mut() {
            last.volume = 48.0;
        }
        let snap = compute_snapshot(&candles);
        // SMA20 = (19 * 10 + 48) / 20 = 11.9
        assert!((snap.volume_ratio - 48.0 / 11.9).abs() < 1e-9);
    }

    #[test]
    fn test_nan_close_falls_back() {
        let mut candles = trending(30, 1.0);
        if let Some(last) = candles.last_mut() {
            last.close = f64::NAN;
        }
        let snap = compute_snapshot(&candles);
        assert_eq!(snap.price, 0.0);
        assert_eq!(snap.rsi, 50.0);
        assert_eq!(snap.prev_price, 128.0);
    }

    #[test]
    fn test_old_nan_close_does_not_poison_window() {
        let clean = compute_snapshot(&trending(250, 1.0));
        let mut candles = trending(250, 1.0);
        candles[10].close = f64::NAN;
        let dirty = compute_snapshot(&candles);

        assert_eq!(dirty.sma_50, clean.sma_50);
        assert_eq!(dirty.sma_200, clean.sma_200);
        assert_eq!(dirty.rsi, 100.0);
        assert!((dirty.macd - clean.macd).abs() < 1e-6);
        assert!((dirty.macd - 7.0).abs() < 1e-6);
        assert!((dirty.atr - clean.atr).abs() < 1e-9);
        assert!((dirty.adx - clean.adx).abs() < 1e-6);
        assert_eq!(dirty.mfi, clean.mfi);
        let momentum = momentum_signal(&dirty);
        assert!(momentum.reasons.iter().any(|r| r.contains("uptrend")), "{:?}", momentum.reasons);
    }
}
