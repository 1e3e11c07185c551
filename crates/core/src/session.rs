//! Per-symbol alert session state.

use crate::{LevelName, PivotLadder};
use serde::{Deserialize, Serialize};

/// Current ladder plus the last observed price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionLevels {
    #[serde(flatten)]
    pub ladder: PivotLadder,
    #[serde(default)]
    pub current_price: f64,
}

/// Alert session for one monitored symbol.
///
/// `alerted_levels` only grows within a session and is the sole
/// deduplication guard. It is cleared exclusively by [`SessionState::rollover`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Close time of the candle the current ladder was computed from (ms)
    pub last_candle_time: i64,
    pub levels: SessionLevels,
    pub alerted_levels: Vec<LevelName>,
}

impl SessionState {
    /// Fresh state: no ladder, so the first closed candle always rolls over.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a ladder has been computed for this symbol yet.
    pub fn has_ladder(&self) -> bool {
        self.last_candle_time > 0
    }

    pub fn ladder(&self) -> Option<&PivotLadder> {
        self.has_ladder().then_some(&self.levels.ladder)
    }

    /// Start a new session if `close_time` is strictly newer than the stored one.
    ///
    /// The ladder is only computed when a rollover actually happens. Returns
    /// true when the session was reset.
    pub fn rollover<F>(&mut self, close_time: i64, compute_ladder: F) -> bool
    where
        F: FnOnce() -> PivotLadder,
    {
        if close_time <= self.last_candle_time {
            return false;
        }

        let mut ladder = compute_ladder();
        ladder.close_time = close_time;
        self.levels.ladder = ladder;
        self.last_candle_time = close_time;
        self.alerted_levels.clear();
        true
    }

    pub fn set_current_price(&mut self, price: f64) {
        self.levels.current_price = price;
    }

    pub fn is_alerted(&self, level: LevelName) -> bool {
        self.alerted_levels.contains(&level)
    }

    /// Record a level as alerted for this session. Returns false if it already was.
    pub fn mark_alerted(&mut self, level: LevelName) -> bool {
        if self.is_alerted(level) {
            return false;
        }
        self.alerted_levels.push(level);
        true
    }

    /// Structural checks applied when loading persisted state.
    pub fn is_consistent(&self) -> bool {
        if self.last_candle_time < 0 {
            return false;
        }
        if self.has_ladder() && !self.levels.ladder.is_ordered() {
            return false;
        }
        let mut seen = Vec::with_capacity(self.alerted_levels.len());
        for level in &self.alerted_levels {
            if seen.contains(level) {
                return false;
            }
            seen.push(*level);
        }
        true
    }
}
