//! Per-group polling monitor.
//!
//! One `LevelMonitor` runs per symbol group (the fixed BTC monitor and the
//! subscriber-driven multi-symbol monitor). Each poll of a symbol runs
//! strictly in sequence: fetch, session rollover, crossing detection,
//! dispatch, persist.

use crate::config::SubscriberScope;
use crate::notifier::{AlertSender, LevelAlert, Notifier, NotifierError};
use crate::registry::SubscriberRegistry;
use crate::store::{SessionStore, StoreError};
use pivotbot_core::candle::{closed_candle, live_candle};
use pivotbot_core::LevelName;
use pivotbot_engine::{
    compute_snapshot, divergence_from_candles, ladder_from_candle, momentum_signal,
    CrossingDetector, DetectorConfig, DEFAULT_DIVERGENCE_LOOKBACK,
};
use pivotbot_feeds::{normalize_symbol, CandleSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Consecutive fetch failures before a symbol is reported unavailable.
pub const FEED_FAILURE_THRESHOLD: u32 = 5;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),
}

/// Configuration for one monitor group.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Group name used in logs and health events (`btc`, `valerts`)
    pub name: String,
    /// Kline interval, one session per candle
    pub interval: String,
    /// Candles fetched per poll
    pub candle_limit: u32,
    /// Sleep between iterations
    pub poll_interval: Duration,
    pub detector: DetectorConfig,
    pub divergence_lookback: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            name: "btc".to_string(),
            interval: "1d".to_string(),
            candle_limit: 250,
            poll_interval: Duration::from_secs(60),
            detector: DetectorConfig::default(),
            divergence_lookback: DEFAULT_DIVERGENCE_LOOKBACK,
        }
    }
}

/// Which symbols a monitor polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolScope {
    /// A fixed list; alerts go to chats with BTC alerts on.
    Fixed(Vec<String>),
    /// Union of every enabled watch list, re-read each iteration.
    Subscribed,
}

impl SymbolScope {
    fn audience(&self) -> SubscriberScope {
        match self {
            SymbolScope::Fixed(_) => SubscriberScope::Btc,
            SymbolScope::Subscribed => SubscriberScope::Watchlist,
        }
    }
}

/// Result of polling one symbol once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No usable data this poll, nothing changed.
    Skipped,
    /// No ladder yet for this symbol.
    Warming,
    /// Ladder in place, nothing new breached.
    Quiet,
    /// An alert was dispatched for this level.
    Alerted(LevelName),
}

/// Health events for the ops channel.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    FeedUnavailable {
        monitor: String,
        symbol: String,
        failures: u32,
    },
    FeedRecovered {
        monitor: String,
        symbol: String,
    },
    PersistenceFailed {
        monitor: String,
        symbol: String,
        error: String,
    },
}

/// Poll loop for one symbol group.
pub struct LevelMonitor {
    config: MonitorConfig,
    scope: SymbolScope,
    source: Arc<dyn CandleSource>,
    registry: Arc<dyn SubscriberRegistry>,
    notifier: Notifier,
    detector: CrossingDetector,
    events: Option<mpsc::Sender<MonitorEvent>>,
    feed_failures: HashMap<String, u32>,
}

impl LevelMonitor {
    pub fn new(
        config: MonitorConfig,
        scope: SymbolScope,
        source: Arc<dyn CandleSource>,
        store: Arc<SessionStore>,
        registry: Arc<dyn SubscriberRegistry>,
        sender: Arc<dyn AlertSender>,
    ) -> Self {
        Self {
            detector: CrossingDetector::new(config.detector),
            config,
            scope,
            source,
            registry,
            notifier: Notifier::new(sender, store),
            events: None,
            feed_failures: HashMap::new(),
        }
    }

    /// Report health events on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<MonitorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn store(&self) -> &SessionStore {
        self.notifier.store()
    }

    /// Symbols to poll this iteration.
    pub async fn symbols(&self) -> Vec<String> {
        match &self.scope {
            SymbolScope::Fixed(symbols) => symbols.iter().map(|s| normalize_symbol(s)).collect(),
            SymbolScope::Subscribed => match self.registry.watched_symbols().await {
                Ok(symbols) => symbols,
                Err(e) => {
                    warn!(monitor = %self.config.name, error = %e, "Failed to read watch lists");
                    Vec::new()
                }
            },
        }
    }

    /// Run forever: poll every symbol, then sleep.
    pub async fn run(mut self) {
        info!(
            monitor = %self.config.name,
            interval = %self.config.interval,
            poll_secs = self.config.poll_interval.as_secs(),
            "Level monitor started"
        );
        loop {
            self.run_once().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll every symbol of the group once. Errors stay per symbol.
    pub async fn run_once(&mut self) -> Vec<(String, PollOutcome)> {
        let symbols = self.symbols().await;
        let mut outcomes = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            match self.poll_symbol(&symbol).await {
                Ok(outcome) => outcomes.push((symbol, outcome)),
                Err(e) => {
                    error!(
                        monitor = %self.config.name,
                        symbol = %symbol,
                        error = %e,
                        "Poll failed"
                    );
                    self.emit(MonitorEvent::PersistenceFailed {
                        monitor: self.config.name.clone(),
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    })
                    .await;
                }
            }
        }
        outcomes
    }

    /// One poll of one symbol.
    pub async fn poll_symbol(&mut self, symbol: &str) -> Result<PollOutcome, MonitorError> {
        let symbol = normalize_symbol(symbol);

        let candles = match self
            .source
            .fetch_candles(&symbol, &self.config.interval, self.config.candle_limit)
            .await
        {
            Some(candles) if candles.len() >= 2 => {
                self.record_feed_success(&symbol).await;
                candles
            }
            _ => {
                self.record_feed_failure(&symbol).await;
                debug!(monitor = %self.config.name, symbol = %symbol, "No candles, skipping poll");
                return Ok(PollOutcome::Skipped);
            }
        };

        let price = match live_candle(&candles).map(|c| c.close) {
            Some(price) if price.is_finite() => price,
            _ => {
                debug!(
                    monitor = %self.config.name,
                    symbol = %symbol,
                    "Live price unusable, skipping poll"
                );
                return Ok(PollOutcome::Skipped);
            }
        };

        let mut state = self.store().load(&symbol).await;

        if let Some(closed) = closed_candle(&candles) {
            match ladder_from_candle(closed) {
                Some(ladder) => {
                    if state.rollover(closed.close_time, || ladder) {
                        info!(
                            monitor = %self.config.name,
                            symbol = %symbol,
                            close_time = closed.close_time,
                            pivot = ladder.p,
                            "New session, pivot ladder recomputed"
                        );
                    }
                }
                None => {
                    debug!(
                        monitor = %self.config.name,
                        symbol = %symbol,
                        "Closed candle unusable, keeping ladder"
                    );
                }
            }
        }

        state.set_current_price(price);

        let Some(ladder) = state.ladder().copied() else {
            self.store().save(&symbol, &state).await?;
            return Ok(PollOutcome::Warming);
        };

        let Some(breach) = self.detector.detect(price, &ladder, &state.alerted_levels) else {
            self.store().save(&symbol, &state).await?;
            return Ok(PollOutcome::Quiet);
        };

        let snapshot = compute_snapshot(&candles);
        let momentum = momentum_signal(&snapshot);
        let divergence = divergence_from_candles(&candles, self.config.divergence_lookback);
        let alert = LevelAlert::new(
            symbol.as_str(),
            breach,
            &ladder,
            &snapshot,
            momentum,
            divergence,
        );

        let subscribers = self.subscribers(&symbol).await;
        self.notifier.dispatch(&alert, &mut state, &subscribers).await?;

        Ok(PollOutcome::Alerted(breach.level))
    }

    /// Current recipients. Lookup errors mean nobody, the level is still committed.
    async fn subscribers(&self, symbol: &str) -> Vec<i64> {
        match self.registry.subscribers_for(self.scope.audience(), symbol).await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(monitor = %self.config.name, symbol, error = %e, "Subscriber lookup failed");
                Vec::new()
            }
        }
    }

    async fn record_feed_failure(&mut self, symbol: &str) {
        let failures = self.feed_failures.entry(symbol.to_string()).or_insert(0);
        *failures += 1;
        let failures = *failures;

        if failures == FEED_FAILURE_THRESHOLD {
            warn!(monitor = %self.config.name, symbol, failures, "Candle feed unavailable");
            self.emit(MonitorEvent::FeedUnavailable {
                monitor: self.config.name.clone(),
                symbol: symbol.to_string(),
                failures,
            })
            .await;
        }
    }

    async fn record_feed_success(&mut self, symbol: &str) {
        if let Some(failures) = self.feed_failures.remove(symbol) {
            if failures >= FEED_FAILURE_THRESHOLD {
                info!(monitor = %self.config.name, symbol, failures, "Candle feed recovered");
                self.emit(MonitorEvent::FeedRecovered {
                    monitor: self.config.name.clone(),
                    symbol: symbol.to_string(),
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: MonitorEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                debug!(monitor = %self.config.name, "Health event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use crate::notifier::tests::RecordingSender;
    use async_trait::async_trait;
    use pivotbot_core::Candle;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const DAY: i64 = 86_400_000;

    /// Serves queued responses, then repeats the last one.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Option<Vec<Candle>>>>,
        last: Mutex<Option<Vec<Candle>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Option<Vec<Candle>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CandleSource for ScriptedSource {
        async fn fetch_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Option<Vec<Candle>> {
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(response) => {
                    *self.last.lock().unwrap() = response.clone();
                    response
                }
                None => self.last.lock().unwrap().clone(),
            }
        }
    }

    struct StaticRegistry {
        chats: Vec<i64>,
        symbols: Vec<String>,
        fail: bool,
    }

    impl StaticRegistry {
        fn new(chats: Vec<i64>) -> Self {
            Self {
                chats,
                symbols: vec!["ETHUSDT".to_string()],
                fail: false,
            }
        }
    }

    #[async_trait]
    impl SubscriberRegistry for StaticRegistry {
        async fn subscribers_for(
            &self,
            _scope: SubscriberScope,
            _symbol: &str,
        ) -> Result<Vec<i64>, DbError> {
            if self.fail {
                return Err(DbError::Sqlx(sqlx::Error::PoolClosed));
            }
            Ok(self.chats.clone())
        }

        async fn watched_symbols(&self) -> Result<Vec<String>, DbError> {
            Ok(self.symbols.clone())
        }
    }

    fn closed(day: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(day * DAY, low, high, low, close, 100.0, (day + 1) * DAY - 1)
    }

    fn live(day: i64, price: f64) -> Candle {
        Candle::new((day + 1) * DAY, price, price, price, price, 10.0, (day + 2) * DAY - 1)
    }

    /// Closed candle of `day` (H=70000, L=69000, C=69500) plus a live candle at `price`.
    fn window(day: i64, price: f64) -> Vec<Candle> {
        vec![
            closed(day, 70000.0, 69000.0, 69500.0),
            Candle::new(
                (day + 1) * DAY,
                69500.0,
                price.max(69500.0),
                price.min(69500.0),
                price,
                10.0,
                (day + 2) * DAY - 1,
            ),
        ]
    }

    /// Same, with a different closed candle (H=72000, L=70000, C=71000).
    fn next_day_window(day: i64, price: f64) -> Vec<Candle> {
        vec![closed(day, 72000.0, 70000.0, 71000.0), live(day, price)]
    }

    struct Harness {
        monitor: LevelMonitor,
        sender: Arc<RecordingSender>,
        store: Arc<SessionStore>,
    }

    fn harness(
        path: &std::path::Path,
        responses: Vec<Option<Vec<Candle>>>,
        registry: StaticRegistry,
    ) -> Harness {
        let sender = Arc::new(RecordingSender::default());
        let store = Arc::new(SessionStore::new(path));
        let monitor = LevelMonitor::new(
            MonitorConfig::default(),
            SymbolScope::Fixed(vec!["BTCUSDT".to_string()]),
            Arc::new(ScriptedSource::new(responses)),
            store.clone(),
            Arc::new(registry),
            sender.clone(),
        );
        Harness {
            monitor,
            sender,
            store,
        }
    }

    async fn poll(h: &mut Harness) -> PollOutcome {
        h.monitor.poll_symbol("BTCUSDT").await.unwrap()
    }

    #[tokio::test]
    async fn test_r1_then_r2_then_rollover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut h = harness(
            &path,
            vec![
                Some(window(0, 69600.0)),
                Some(window(0, 70080.0)),
                Some(window(0, 70090.0)),
                Some(window(0, 70600.0)),
                Some(next_day_window(1, 71200.0)),
            ],
            StaticRegistry::new(vec![10, 20]),
        );

        // first poll builds the ladder; 69600 is above P by more than 0.1%
        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::PivotUp));

        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::R1));
        let state = h.store.load("BTCUSDT").await;
        assert_eq!(state.alerted_levels, vec![LevelName::PivotUp, LevelName::R1]);
        assert_eq!(state.levels.ladder.r3, 71000.0);
        assert_eq!(state.levels.ladder.s3, 68000.0);

        // still above R1, same session: nothing new
        assert_eq!(poll(&mut h).await, PollOutcome::Quiet);
        assert_eq!(h.store.load("BTCUSDT").await.levels.current_price, 70090.0);

        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::R2));
        assert_eq!(
            h.store.load("BTCUSDT").await.alerted_levels,
            vec![LevelName::PivotUp, LevelName::R1, LevelName::R2]
        );

        // new closed candle: session resets and the ladder moves
        let outcome = poll(&mut h).await;
        let state = h.store.load("BTCUSDT").await;
        assert_eq!(state.last_candle_time, 2 * DAY - 1);
        assert_eq!(state.levels.ladder.p, 71000.0);
        assert_eq!(outcome, PollOutcome::Alerted(LevelName::PivotUp));
        assert_eq!(state.alerted_levels, vec![LevelName::PivotUp]);

        let sent = h.sender.messages();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(_, chats)| *chats == vec![10, 20]));
    }

    #[tokio::test]
    async fn test_restart_resumes_session_without_realerting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        {
            let responses = vec![Some(window(0, 70080.0))];
            let mut h = harness(&path, responses, StaticRegistry::new(vec![1]));
            assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::R1));
        }

        // new process, same file, same session, price still above R1
        let mut h = harness(&path, vec![Some(window(0, 70100.0))], StaticRegistry::new(vec![1]));
        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::PivotUp));
        assert_eq!(poll(&mut h).await, PollOutcome::Quiet);

        let state = h.store.load("BTCUSDT").await;
        assert_eq!(state.alerted_levels, vec![LevelName::R1, LevelName::PivotUp]);
        assert!(h.sender.messages().iter().all(|(msg, _)| !msg.contains("above R1")));
    }

    #[tokio::test]
    async fn test_same_candle_twice_does_not_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut h = harness(
            &path,
            vec![Some(window(0, 70080.0)), Some(window(0, 69500.0))],
            StaticRegistry::new(vec![1]),
        );
        poll(&mut h).await;
        assert_eq!(poll(&mut h).await, PollOutcome::Quiet);
        assert_eq!(h.store.load("BTCUSDT").await.alerted_levels, vec![LevelName::R1]);
    }

    #[tokio::test]
    async fn test_missing_data_skips_without_state_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut nan_price = window(0, 70080.0);
        nan_price[1].close = f64::NAN;
        let mut h = harness(
            &path,
            vec![None, Some(window(0, 70080.0)[..1].to_vec()), Some(nan_price)],
            StaticRegistry::new(vec![1]),
        );

        for _ in 0..3 {
            assert_eq!(poll(&mut h).await, PollOutcome::Skipped);
        }
        assert!(!path.exists());
        assert!(h.sender.messages().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_closed_candle_warms_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut bad = window(0, 70080.0);
        bad[0].high = f64::NAN;
        let mut h = harness(&path, vec![Some(bad)], StaticRegistry::new(vec![1]));

        assert_eq!(poll(&mut h).await, PollOutcome::Warming);
        let state = h.store.load("BTCUSDT").await;
        assert!(!state.has_ladder());
        assert_eq!(state.levels.current_price, 70080.0);
    }

    #[tokio::test]
    async fn test_closed_candle_outside_range_keeps_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        // close above the high would produce an unordered ladder
        let malformed = vec![closed(1, 70000.0, 69000.0, 75000.0), live(1, 70100.0)];
        let mut h = harness(
            &path,
            vec![
                Some(window(0, 70080.0)),
                Some(window(0, 70080.0)),
                Some(malformed.clone()),
                Some(malformed),
            ],
            StaticRegistry::new(vec![1]),
        );

        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::R1));
        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::PivotUp));
        assert_eq!(poll(&mut h).await, PollOutcome::Quiet);
        assert_eq!(poll(&mut h).await, PollOutcome::Quiet);

        // the stored session survives reload and nothing re-alerts
        let state = h.store.load("BTCUSDT").await;
        assert_eq!(state.last_candle_time, DAY - 1);
        assert_eq!(state.alerted_levels, vec![LevelName::R1, LevelName::PivotUp]);
        assert_eq!(state.levels.current_price, 70100.0);
        assert_eq!(h.sender.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_failure_still_commits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut registry = StaticRegistry::new(vec![1]);
        registry.fail = true;
        let mut h = harness(&path, vec![Some(window(0, 70080.0))], registry);

        assert_eq!(poll(&mut h).await, PollOutcome::Alerted(LevelName::R1));
        assert!(h.sender.messages().is_empty());
        assert_eq!(h.store.load("BTCUSDT").await.alerted_levels, vec![LevelName::R1]);
    }

    #[tokio::test]
    async fn test_feed_health_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc_state.json");
        let mut responses = vec![None; FEED_FAILURE_THRESHOLD as usize + 1];
        responses.push(Some(window(0, 69500.0)));
        let (tx, mut rx) = mpsc::channel(8);
        let mut h = harness(&path, responses, StaticRegistry::new(vec![1]));
        h.monitor = h.monitor.with_events(tx);

        for _ in 0..=FEED_FAILURE_THRESHOLD {
            h.monitor.run_once().await;
        }
        h.monitor.run_once().await;

        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::FeedUnavailable {
                monitor: "btc".to_string(),
                symbol: "BTCUSDT".to_string(),
                failures: FEED_FAILURE_THRESHOLD,
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::FeedRecovered {
                monitor: "btc".to_string(),
                symbol: "BTCUSDT".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_event() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut h = harness(
            &blocker.join("state.json"),
            vec![Some(window(0, 69500.0))],
            StaticRegistry::new(vec![1]),
        );
        h.monitor = h.monitor.with_events(tx);

        let outcomes = h.monitor.run_once().await;
        assert!(outcomes.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            MonitorEvent::PersistenceFailed { symbol, .. } if symbol == "BTCUSDT"
        ));
    }

    #[tokio::test]
    async fn test_subscribed_scope_reads_watch_lists() {
        let dir = tempdir().unwrap();
        let sender = Arc::new(RecordingSender::default());
        let monitor = LevelMonitor::new(
            MonitorConfig {
                name: "valerts".to_string(),
                ..Default::default()
            },
            SymbolScope::Subscribed,
            Arc::new(ScriptedSource::new(vec![])),
            Arc::new(SessionStore::new(dir.path().join("valerts_state.json"))),
            Arc::new(StaticRegistry::new(vec![1])),
            sender,
        );
        assert_eq!(monitor.symbols().await, vec!["ETHUSDT"]);
        assert_eq!(SymbolScope::Subscribed.audience(), SubscriberScope::Watchlist);
        assert_eq!(SymbolScope::Fixed(vec![]).audience(), SubscriberScope::Btc);
    }
}
