//! Alert dispatch: send first, then commit the level to the session.

use crate::store::{SessionStore, StoreError};
use crate::telegram::format_level_alert;
use async_trait::async_trait;
use pivotbot_core::{
    DivergenceEvent, IndicatorSnapshot, LevelName, MomentumSignal, PivotLadder, SessionState,
};
use pivotbot_engine::{breach_targets, LevelBreach};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

/// Message delivery capability.
#[async_trait]
pub trait AlertSender: Send + Sync {
    /// Send `message` to every recipient. Returns the recipients that failed
    /// with their error text; never fails as a whole.
    async fn send(&self, message: &str, recipients: &[i64]) -> HashMap<i64, String>;
}

/// Everything an alert message needs, captured at the moment of the breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelAlert {
    pub symbol: String,
    pub breach: LevelBreach,
    pub momentum: MomentumSignal,
    pub divergence: Option<DivergenceEvent>,
    /// Indicator readings on the poll that detected the breach
    pub indicators: IndicatorSnapshot,
    pub targets: Vec<f64>,
    /// Close time of the candle the ladder was computed from (ms)
    pub session_close_time: i64,
}

impl LevelAlert {
    pub fn new(
        symbol: impl Into<String>,
        breach: LevelBreach,
        ladder: &PivotLadder,
        snapshot: &IndicatorSnapshot,
        momentum: MomentumSignal,
        divergence: Option<DivergenceEvent>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            targets: breach_targets(&breach, ladder, snapshot.atr),
            breach,
            momentum,
            divergence,
            indicators: *snapshot,
            session_close_time: ladder.close_time,
        }
    }

    pub fn level(&self) -> LevelName {
        self.breach.level
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub recipients: usize,
    pub failures: HashMap<i64, String>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.recipients.saturating_sub(self.failures.len())
    }
}

/// Alert dispatcher bound to one monitor group's session store.
pub struct Notifier {
    sender: Arc<dyn AlertSender>,
    store: Arc<SessionStore>,
}

impl Notifier {
    pub fn new(sender: Arc<dyn AlertSender>, store: Arc<SessionStore>) -> Self {
        Self { sender, store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Deliver `alert` to `subscribers`, then mark its level alerted and persist.
    ///
    /// The level is committed whatever happened to delivery, including when
    /// there is nobody to deliver to. A crash between send and save can
    /// repeat the alert after restart; it can never lose one.
    pub async fn dispatch(
        &self,
        alert: &LevelAlert,
        state: &mut SessionState,
        subscribers: &[i64],
    ) -> Result<DispatchReport, NotifierError> {
        let symbol = alert.symbol.as_str();
        let level = alert.level();

        let failures = if subscribers.is_empty() {
            debug!(symbol, level = %level, "No subscribers for alert");
            HashMap::new()
        } else {
            let message = format_level_alert(alert);
            self.sender.send(&message, subscribers).await
        };

        for (chat_id, error) in &failures {
            warn!(symbol, level = %level, chat_id, error = %error, "Failed to deliver alert");
        }

        let report = DispatchReport {
            recipients: subscribers.len(),
            failures,
        };
        info!(
            symbol,
            level = %level,
            price = alert.breach.price,
            recipients = report.recipients,
            delivered = report.delivered(),
            "Level alert dispatched"
        );

        state.mark_alerted(level);
        self.store.save(symbol, state).await?;

        Ok(report)
    }
}
