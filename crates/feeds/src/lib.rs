//! Market data collection from exchange REST APIs.
//!
//! - `source` - the `CandleSource` capability consumed by the monitors
//! - `rest` - Binance kline fetcher with endpoint fallback
//! - `error` - feed error taxonomy

pub mod error;
pub mod rest;
pub mod source;

pub use error::*;
pub use rest::*;
pub use source::*;
