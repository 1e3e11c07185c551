//! Status notifier for monitor health events.
//!
//! Posts to an admin Telegram chat when a symbol's candle feed goes dark,
//! when it comes back, and when session state could not be persisted.

use pivotbot_alerts::{escape_html, MonitorEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Configuration for status notifications.
#[derive(Debug, Clone)]
pub struct StatusNotifierConfig {
    /// Telegram bot token for status notifications
    pub bot_token: String,
    /// Telegram chat ID to send notifications to
    pub chat_id: String,
    /// Whether to send notifications on feed recovery
    pub notify_on_recovery: bool,
}

impl StatusNotifierConfig {
    /// Create config from environment variables.
    /// Uses TELEGRAM_STATUS_BOT_TOKEN and TELEGRAM_STATUS_CHAT_ID.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_STATUS_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_STATUS_CHAT_ID").ok()?;

        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }

        Some(Self {
            bot_token,
            chat_id,
            notify_on_recovery: true,
        })
    }
}

/// Status notifier that sends Telegram messages for monitor events.
pub struct StatusNotifier {
    config: StatusNotifierConfig,
    http_client: reqwest::Client,
    hostname: String,
}

impl StatusNotifier {
    /// Create a new status notifier.
    pub fn new(config: StatusNotifierConfig) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            config,
            http_client: reqwest::Client::new(),
            hostname,
        }
    }

    /// Body text for an event, `None` when the event is muted.
    fn describe(&self, event: &MonitorEvent) -> Option<String> {
        let message = match event {
            MonitorEvent::FeedUnavailable {
                monitor,
                symbol,
                failures,
            } => format!(
                "⚠️ <b>{}</b> [{}] candle feed unavailable\n{} consecutive failed polls",
                symbol, monitor, failures
            ),
            MonitorEvent::FeedRecovered { monitor, symbol } => {
                if !self.config.notify_on_recovery {
                    return None;
                }
                format!("🔄 <b>{}</b> [{}] candle feed recovered", symbol, monitor)
            }
            MonitorEvent::PersistenceFailed {
                monitor,
                symbol,
                error,
            } => format!(
                "🚫 <b>{}</b> [{}] session state not saved\n{}",
                symbol,
                monitor,
                escape_html(error)
            ),
        };
        Some(message)
    }

    /// Full message with hostname and timestamp.
    fn render(&self, event: &MonitorEvent, now: chrono::DateTime<chrono::Utc>) -> Option<String> {
        let message = self.describe(event)?;
        Some(format!(
            "<b>{}</b>\n{}\n\n⏰ {}",
            escape_html(&self.hostname),
            message,
            now.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    }

    /// Send a status notification.
    pub async fn notify(&self, event: &MonitorEvent) {
        let Some(message) = self.render(event, chrono::Utc::now()) else {
            return;
        };

        if let Err(e) = self.send_telegram_message(&message).await {
            error!("Failed to send status notification: {}", e);
        }
    }

    /// Send a message via Telegram Bot API.
    async fn send_telegram_message(&self, message: &str) -> Result<(), reqwest::Error> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.bot_token
        );

        let params = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", message),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];

        let response = self.http_client.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            warn!(
                "Telegram API returned non-success status: {}",
                response.status()
            );
        }

        Ok(())
    }
}

/// Start the status notifier background task.
/// Returns the sender monitors report their events on.
pub fn start_status_notifier(config: StatusNotifierConfig) -> mpsc::Sender<MonitorEvent> {
    let (tx, mut rx) = mpsc::channel::<MonitorEvent>(100);

    let notifier = Arc::new(StatusNotifier::new(config));

    tokio::spawn(async move {
        info!("Status notifier started");

        while let Some(event) = rx.recv().await {
            notifier.notify(&event).await;
        }

        info!("Status notifier stopped");
    });

    tx
}

/// Try to create and start a status notifier from environment variables.
/// Returns None if the required environment variables are not set.
pub fn try_start_status_notifier() -> Option<mpsc::Sender<MonitorEvent>> {
    match StatusNotifierConfig::from_env() {
        Some(config) => {
            info!(
                "Status notifier enabled (chat_id: {})",
                &config.chat_id[..config.chat_id.len().min(6)]
            );
            Some(start_status_notifier(config))
        }
        None => {
            info!(
                "Status notifier disabled \
                 (TELEGRAM_STATUS_BOT_TOKEN or TELEGRAM_STATUS_CHAT_ID not set)"
            );
            None
        }
    }
}
