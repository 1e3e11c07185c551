//! REST kline fetchers.
//!
//! Fetches OHLCV candles from Binance, trying an ordered list of equivalent
//! API hosts until one returns usable data.

use crate::error::FeedError;
use crate::source::CandleSource;
use async_trait::async_trait;
use pivotbot_core::Candle;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Minimum rows a response needs: one closed candle plus the live one.
pub const MIN_CANDLE_ROWS: usize = 2;

/// Equivalent Binance spot hosts, in fallback order.
pub const DEFAULT_BINANCE_ENDPOINTS: &[&str] = &[
    "https://api.binance.com",
    "https://api1.binance.com",
    "https://api2.binance.com",
    "https://api3.binance.com",
    "https://data-api.binance.vision",
];

/// Quote assets recognised when normalising a symbol.
const QUOTES: &[&str] = &["USDT", "USDC", "FDUSD", "BUSD"];

/// Normalise a user symbol to a Binance pair: `eth` -> `ETHUSDT`.
pub fn normalize_symbol(symbol: &str) -> String {
    let symbol = symbol.trim().to_uppercase();
    let has_quote = QUOTES
        .iter()
        .any(|quote| matches!(symbol.strip_suffix(quote), Some(base) if !base.is_empty()));
    if has_quote {
        symbol
    } else {
        format!("{}USDT", symbol)
    }
}

/// Coerce a kline field to f64. Unparseable values become NaN.
fn coerce_f64(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Parse a Binance klines response body.
///
/// Rows look like `[open_time, "open", "high", "low", "close", "volume", close_time, ...]`.
/// Rows that are too short or lack an integer open time are dropped; bad
/// numeric fields are kept as NaN.
pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, FeedError> {
    let rows = body
        .as_array()
        .ok_or_else(|| FeedError::ParseError("Expected a JSON array of klines".to_string()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fields) = row.as_array() else {
            continue;
        };
        if fields.len() < 7 {
            continue;
        }
        let Some(open_time) = coerce_i64(&fields[0]) else {
            continue;
        };
        let close_time = coerce_i64(&fields[6]).unwrap_or(open_time);

        candles.push(Candle::new(
            open_time,
            coerce_f64(&fields[1]),
            coerce_f64(&fields[2]),
            coerce_f64(&fields[3]),
            coerce_f64(&fields[4]),
            coerce_f64(&fields[5]),
            close_time,
        ));
    }

    Ok(candles)
}

/// Try each endpoint in order and return the first response with enough rows.
///
/// Returns the last error seen when every endpoint fails.
pub async fn first_valid<F, Fut>(
    endpoints: &[String],
    mut fetch: F,
) -> Result<Vec<Candle>, FeedError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<Candle>, FeedError>>,
{
    let mut last_error = FeedError::NoEndpoints;

    for endpoint in endpoints {
        match fetch(endpoint.clone()).await {
            Ok(candles) if candles.len() >= MIN_CANDLE_ROWS => return Ok(candles),
            Ok(candles) => {
                debug!(
                    endpoint = %endpoint,
                    rows = candles.len(),
                    "Kline response too short, trying next endpoint"
                );
                last_error = FeedError::InsufficientData { rows: candles.len() };
            }
            Err(e) => {
                debug!(
                    endpoint = %endpoint,
                    error = %e,
                    transient = e.is_transient(),
                    retry_after = ?e.suggested_retry_delay(),
                    "Kline endpoint failed, trying next endpoint"
                );
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Binance REST kline fetcher.
#[derive(Debug, Clone)]
pub struct BinanceKlineFetcher {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl BinanceKlineFetcher {
    /// Create a fetcher over the given hosts with a per-request timeout.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Fetch klines from a single host.
    async fn fetch_from(
        &self,
        base_url: &str,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, FeedError> {
        let url = format!("{}/api/v3/klines", base_url.trim_end_matches('/'));
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::from_status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        parse_klines(&body)
    }

    /// Fetch klines, falling back through every configured host.
    pub async fn fetch_with_fallback(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, FeedError> {
        let pair = normalize_symbol(symbol);
        let pair = pair.as_str();
        first_valid(&self.endpoints, |base| async move {
            self.fetch_from(&base, pair, interval, limit).await
        })
        .await
    }
}

#[async_trait]
impl CandleSource for BinanceKlineFetcher {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Option<Vec<Candle>> {
        match self.fetch_with_fallback(symbol, interval, limit).await {
            Ok(candles) => {
                debug!(symbol, interval, rows = candles.len(), "Fetched klines");
                Some(candles)
            }
            Err(e) => {
                warn!(symbol, interval, error = %e, "All kline endpoints failed");
                None
            }
        }
    }
}
