//! Additive momentum score.

use pivotbot_core::{IndicatorSnapshot, MomentumLabel, MomentumSignal};

/// Score an indicator snapshot.
///
/// Contributions are evaluated RSI, MACD, moving averages, volume, and each
/// records its reason in that order. Pure function of the snapshot.
pub fn momentum_signal(snap: &IndicatorSnapshot) -> MomentumSignal {
    let mut score = 0;
    let mut reasons = Vec::with_capacity(4);

    let (points, reason) = rsi_contribution(snap.rsi);
    score += points;
    reasons.push(reason);

    let (points, reason) = macd_contribution(snap.macd, snap.macd_hist);
    score += points;
    reasons.push(reason);

    let (points, reason) = trend_contribution(snap.price, snap.sma_50, snap.sma_200);
    score += points;
    reasons.push(reason);

    if let Some((points, reason)) = volume_contribution(snap.volume_ratio) {
        score += points;
        reasons.push(reason);
    }

    MomentumSignal {
        label: MomentumLabel::from_score(score),
        score,
        reasons,
    }
}

fn rsi_contribution(rsi: f64) -> (i32, String) {
    if rsi > 70.0 {
        (0, format!("RSI {:.1} overbought", rsi))
    } else if rsi > 60.0 {
        (2, format!("RSI {:.1} strong", rsi))
    } else if rsi > 50.0 {
        (1, format!("RSI {:.1} above midline", rsi))
    } else if rsi > 40.0 {
        (-1, format!("RSI {:.1} below midline", rsi))
    } else if rsi >= 30.0 {
        (-2, format!("RSI {:.1} weak", rsi))
    } else {
        (0, format!("RSI {:.1} oversold", rsi))
    }
}

fn macd_contribution(macd: f64, hist: f64) -> (i32, String) {
    if hist > 0.0 {
        if hist > 0.5 * macd {
            (2, "MACD histogram expanding bullish".to_string())
        } else {
            (1, "MACD bullish".to_string())
        }
    } else if hist < 0.5 * macd {
        (-2, "MACD histogram expanding bearish".to_string())
    } else {
        (-1, "MACD bearish".to_string())
    }
}

fn trend_contribution(price: f64, sma_50: f64, sma_200: f64) -> (i32, String) {
    if price > sma_50 && sma_50 > sma_200 {
        (4, "Price above SMA50 > SMA200 (uptrend)".to_string())
    } else if price > sma_50 {
        (2, "Price above SMA50".to_string())
    } else if price > sma_200 {
        (1, "Price above SMA200 only".to_string())
    } else {
        (-3, "Price below SMA50 and SMA200".to_string())
    }
}

fn volume_contribution(ratio: f64) -> Option<(i32, String)> {
    if ratio > 1.2 {
        Some((2, format!("Volume {:.1}x average", ratio)))
    } else if ratio < 0.8 {
        Some((-1, format!("Volume {:.1}x average (thin)", ratio)))
    } else {
        None
    }
}
