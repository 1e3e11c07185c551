//! Core data types for the pivot level alert bot.

pub mod candle;
pub mod level;
pub mod session;
pub mod signal;

pub use candle::*;
pub use level::*;
pub use session::*;
pub use signal::*;
