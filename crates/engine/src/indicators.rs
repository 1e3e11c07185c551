//! Indicator series.
//!
//! Every function returns a vector the same length as its input, with NaN
//! where the indicator is not yet defined. A non-finite input value makes
//! every window that contains it undefined; smoothed indicators re-seed
//! after the gap, so one bad candle never poisons the rest of the series
//! and indicators can be chained.

/// Simple Moving Average. Windows holding a non-finite value are NaN.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for (i, window) in data.windows(period).enumerate() {
        if window.iter().all(|v| v.is_finite()) {
            result[i + period - 1] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    smooth(data, period, |prev, x| alpha * x + (1.0 - alpha) * prev)
}

/// Wilder smoothing (RMA): seeded with the mean of the first `period` values,
/// then `prev + (x - prev) / period`.
pub fn wilder(data: &[f64], period: usize) -> Vec<f64> {
    smooth(data, period, |prev, x| prev + (x - prev) / period as f64)
}

/// Recursive smoothing seeded with the mean of `period` consecutive finite
/// values. A non-finite value drops the state; the next seed needs a fresh
/// run of `period` finite values.
fn smooth<F>(data: &[f64], period: usize, step: F) -> Vec<f64>
where
    F: Fn(f64, f64) -> f64,
{
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 {
        return result;
    }

    let mut prev: Option<f64> = None;
    let mut run = 0usize;
    for (i, &x) in data.iter().enumerate() {
        if !x.is_finite() {
            prev = None;
            run = 0;
            continue;
        }
        run += 1;
        prev = match prev {
            Some(p) => Some(step(p, x)),
            None if run >= period => {
                Some(data[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
            }
            None => None,
        };
        if let Some(p) = prev {
            result[i] = p;
        }
    }
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// The first value is defined at index `period`. A window with no losses
/// reads 100, a window with no movement at all reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }

    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
        // NaN closes propagate rather than silently becoming zero moves
        if change.is_nan() {
            gains[i] = f64::NAN;
            losses[i] = f64::NAN;
        }
    }

    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);

    for i in period..n {
        let (g, l) = (avg_gain[i], avg_loss[i]);
        result[i] = if g.is_nan() || l.is_nan() {
            f64::NAN
        } else if l == 0.0 && g == 0.0 {
            50.0
        } else if l == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + g / l)
        };
    }
    result
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone)]
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Moving Average Convergence Divergence.
pub fn macd(data: &[f64], fast: usize, slow: usize, signal: usize) -> MacdResult {
    let fast_ema = ema(data, fast);
    let slow_ema = ema(data, slow);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal);
    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger bands.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger bands around an SMA, `num_std` population standard deviations wide.
pub fn bollinger(data: &[f64], period: usize, num_std: f64) -> BollingerResult {
    let n = data.len();
    let middle = sma(data, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period > 0 {
        for i in (period.saturating_sub(1))..n {
            let mean = middle[i];
            if mean.is_nan() {
                continue;
            }
            let window = &data[i + 1 - period..=i];
            let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
            let std = var.sqrt();
            upper[i] = mean + num_std * std;
            lower[i] = mean - num_std * std;
        }
    }

    BollingerResult {
        upper,
        middle,
        lower,
    }
}

/// True range. The first bar has no previous close and uses high - low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut result = Vec::with_capacity(n);
    for i in 0..n {
        let hl = high[i] - low[i];
        if i == 0 {
            result.push(hl);
            continue;
        }
        let hc = (high[i] - close[i - 1]).abs();
        let lc = (low[i] - close[i - 1]).abs();
        // f64::max drops NaN operands
        if hl.is_nan() || hc.is_nan() || lc.is_nan() {
            result.push(f64::NAN);
        } else {
            result.push(hl.max(hc).max(lc));
        }
    }
    result
}

/// Average True Range with Wilder smoothing.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    wilder(&true_range(high, low, close), period)
}

/// Money Flow Index.
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], period: usize) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len()).min(volume.len());
    let mut result = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return result;
    }

    let typical: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let raw_flow: Vec<f64> = (0..n).map(|i| typical[i] * volume[i]).collect();

    for i in period..n {
        // the comparison at i + 1 - period reads one bar further back
        if !((i - period)..=i).all(|j| typical[j].is_finite() && raw_flow[j].is_finite()) {
            continue;
        }

        let mut positive = 0.0;
        let mut negative = 0.0;
        for j in (i + 1 - period)..=i {
            if typical[j] > typical[j - 1] {
                positive += raw_flow[j];
            } else if typical[j] < typical[j - 1] {
                negative += raw_flow[j];
            }
        }

        result[i] = if negative == 0.0 && positive == 0.0 {
            50.0
        } else if negative == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + positive / negative)
        };
    }
    result
}

/// Average Directional Index.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    if period == 0 || n <= period {
        return vec![f64::NAN; n];
    }

    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    let mut tr = vec![f64::NAN; n];
    let ranges = true_range(high, low, close);
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up.is_nan() || down.is_nan() {
            continue;
        }
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = ranges[i];
    }

    let smooth_tr = wilder(&tr, period);
    let smooth_plus = wilder(&plus_dm, period);
    let smooth_minus = wilder(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            let atr = smooth_tr[i];
            if atr.is_nan() || atr == 0.0 {
                return f64::NAN;
            }
            let plus_di = 100.0 * smooth_plus[i] / atr;
            let minus_di = 100.0 * smooth_minus[i] / atr;
            let sum = plus_di + minus_di;
            if sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    wilder(&dx, period)
}

/// Last value of a series, or `default` when it is missing or not finite.
pub fn last_or(series: &[f64], default: f64) -> f64 {
    nth_back_or(series, 0, default)
}

/// Value `back` positions before the end, or `default` when unusable.
pub fn nth_back_or(series: &[f64], back: usize, default: f64) -> f64 {
    series
        .len()
        .checked_sub(back + 1)
        .map(|i| series[i])
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
