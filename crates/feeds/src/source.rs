//! Candle source capability.

use async_trait::async_trait;
use pivotbot_core::Candle;

/// Something that can return recent candles for a symbol.
///
/// `None` means "skip this poll and retry later", never a fatal condition.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` candles of `interval` for `symbol`, oldest first.
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32)
        -> Option<Vec<Candle>>;
}
