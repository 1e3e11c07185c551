//! Subscription types.

use pivotbot_feeds::normalize_symbol;
use serde::{Deserialize, Serialize};

/// Which monitor group an alert belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriberScope {
    /// Fixed BTC monitor, opt-in via `btc_alerts`.
    Btc,
    /// Multi-symbol monitor, opt-in per symbol via the watch list.
    Watchlist,
}

/// Chat subscription stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Database ID
    pub id: i64,
    /// Telegram chat ID
    pub chat_id: i64,
    /// Receive alerts from the BTC monitor
    pub btc_alerts: bool,
    /// Watched pairs, normalised (`ETHUSDT`)
    pub symbols: Vec<String>,
    /// Whether alerts are enabled
    pub enabled: bool,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            id: 0,
            chat_id: 0,
            btc_alerts: true,
            symbols: Vec::new(),
            enabled: true,
        }
    }
}

impl Subscription {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            ..Default::default()
        }
    }

    /// Whether the watch list contains `symbol` (any notation).
    pub fn watches(&self, symbol: &str) -> bool {
        let pair = normalize_symbol(symbol);
        self.symbols.iter().any(|s| *s == pair)
    }

    /// Whether this chat should receive an alert for `symbol` in `scope`.
    pub fn wants(&self, scope: SubscriberScope, symbol: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match scope {
            SubscriberScope::Btc => self.btc_alerts,
            SubscriberScope::Watchlist => self.watches(symbol),
        }
    }

    /// Add symbols to the watch list. Returns the pairs that were newly added.
    pub fn watch<I, S>(&mut self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().trim();
            if symbol.is_empty() {
                continue;
            }
            let pair = normalize_symbol(symbol);
            if !self.symbols.contains(&pair) {
                self.symbols.push(pair.clone());
                added.push(pair);
            }
        }
        added
    }

    /// Remove a symbol from the watch list. Returns false if it was not watched.
    pub fn unwatch(&mut self, symbol: &str) -> bool {
        let pair = normalize_symbol(symbol);
        let before = self.symbols.len();
        self.symbols.retain(|s| *s != pair);
        self.symbols.len() != before
    }
}
