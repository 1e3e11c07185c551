//! Classic floor-trader pivot ladder.

use pivotbot_core::{Candle, PivotLadder};

/// Compute the seven-point ladder from one candle's high, low and close.
///
/// - P  = (H + L + C) / 3
/// - R1 = 2P - L,        S1 = 2P - H
/// - R2 = P + (H - L),   S2 = P - (H - L)
/// - R3 = H + 2(P - L),  S3 = L - 2(H - P)
pub fn compute_ladder(high: f64, low: f64, close: f64) -> PivotLadder {
    let p = (high + low + close) / 3.0;
    let range = high - low;

    PivotLadder {
        p,
        r1: 2.0 * p - low,
        s1: 2.0 * p - high,
        r2: p + range,
        s2: p - range,
        r3: high + 2.0 * (p - low),
        s3: low - 2.0 * (high - p),
        close_time: 0,
    }
}

/// Ladder for a closed candle, tagged with its close time.
///
/// Returns `None` when the candle's high/low/close are unusable or do not
/// describe a real bar (close outside the high-low range). Any ladder
/// returned passes [`PivotLadder::is_ordered`], the rule persisted sessions
/// are validated against.
pub fn ladder_from_candle(candle: &Candle) -> Option<PivotLadder> {
    if !candle.has_finite_hlc() || !(candle.low..=candle.high).contains(&candle.close) {
        return None;
    }
    let mut ladder = compute_ladder(candle.high, candle.low, candle.close);
    ladder.close_time = candle.close_time;
    ladder.is_ordered().then_some(ladder)
}
