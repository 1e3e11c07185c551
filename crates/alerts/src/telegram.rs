//! Telegram bot handlers and alert rendering.

use crate::config::Subscription;
use crate::db::{Database, DbError};
use crate::notifier::{AlertSender, LevelAlert};
use crate::store::SessionStore;
use async_trait::async_trait;
use futures_util::future::join_all;
use pivotbot_core::{BreachDirection, IndicatorSnapshot, LevelName, SessionState};
use pivotbot_feeds::normalize_symbol;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html::escape;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and register for BTC alerts")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Toggle BTC level alerts. Usage: /btc on|off")]
    Btc(String),
    #[command(description = "Watch symbols. Usage: /watch BTC,ETH")]
    Watch(String),
    #[command(description = "Stop watching symbols. Usage: /unwatch ETH (or 'all')")]
    Unwatch(String),
    #[command(description = "Show current settings")]
    List,
    #[command(description = "Show today's pivot levels. Usage: /levels ETH")]
    Levels(String),
    #[command(description = "Pause alerts")]
    Pause,
    #[command(description = "Resume alerts")]
    Resume,
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    db: Database,
    stores: Vec<Arc<SessionStore>>,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str, db: Database) -> Self {
        let bot = Bot::new(token);
        Self {
            bot,
            db,
            stores: Vec::new(),
        }
    }

    /// Make a monitor group's session state visible to `/levels`.
    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Send an HTML message to a chat.
    pub async fn send_alert(&self, chat_id: i64, message: &str) -> Result<(), TelegramError> {
        self.bot
            .send_message(ChatId(chat_id), message)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    /// Run the bot command handler.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    /// First stored session for `symbol` across the attached stores.
    async fn find_session(&self, symbol: &str) -> Option<SessionState> {
        for store in &self.stores {
            if let Some(state) = store.get(symbol).await.filter(|s| s.has_ladder()) {
                return Some(state);
            }
        }
        None
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id.0;

        match cmd {
            Command::Start => {
                let mut sub = self.db.get_or_create_subscription(chat_id).await?;
                sub.btc_alerts = true;
                sub.enabled = true;
                self.db.update_subscription(&sub).await?;
                let text = format!(
                    "Welcome to the pivot level alert bot!\n\n\
                     Your chat is registered and BTC level alerts are on.\n\
                     Add more symbols with /watch ETH,SOL.\n\n\
                     {}",
                    format_subscription(&sub)
                );
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Help => {
                bot.send_message(msg.chat.id, Command::descriptions().to_string())
                    .await?;
            }

            Command::Btc(value) => match parse_toggle(&value) {
                Some(on) => {
                    let mut sub = self.db.get_or_create_subscription(chat_id).await?;
                    sub.btc_alerts = on;
                    self.db.update_subscription(&sub).await?;
                    let reply = if on { "BTC level alerts on" } else { "BTC level alerts off" };
                    bot.send_message(msg.chat.id, reply).await?;
                }
                None => {
                    bot.send_message(msg.chat.id, "Usage: /btc on|off").await?;
                }
            },

            Command::Watch(value) => {
                let symbols = parse_symbol_list(&value);
                if symbols.is_empty() {
                    bot.send_message(msg.chat.id, "Usage: /watch BTC,ETH").await?;
                    return Ok(());
                }
                let mut sub = self.db.get_or_create_subscription(chat_id).await?;
                let added = sub.watch(&symbols);
                self.db.update_subscription(&sub).await?;
                let reply = if added.is_empty() {
                    "Already watching those symbols".to_string()
                } else {
                    format!("Watching: {}", added.join(", "))
                };
                bot.send_message(msg.chat.id, reply).await?;
            }

            Command::Unwatch(value) => {
                let value = value.trim();
                let mut sub = self.db.get_or_create_subscription(chat_id).await?;

                if value.eq_ignore_ascii_case("all") {
                    sub.symbols.clear();
                    self.db.update_subscription(&sub).await?;
                    bot.send_message(msg.chat.id, "Watch list cleared").await?;
                } else {
                    let symbols = parse_symbol_list(value);
                    if symbols.is_empty() {
                        bot.send_message(msg.chat.id, "Usage: /unwatch ETH (or 'all')")
                            .await?;
                        return Ok(());
                    }
                    let removed: Vec<String> = symbols
                        .iter()
                        .filter(|s| sub.unwatch(s))
                        .map(|s| normalize_symbol(s))
                        .collect();
                    self.db.update_subscription(&sub).await?;
                    let reply = if removed.is_empty() {
                        "None of those symbols were watched".to_string()
                    } else {
                        format!("Stopped watching: {}", removed.join(", "))
                    };
                    bot.send_message(msg.chat.id, reply).await?;
                }
            }

            Command::List => {
                let sub = self.db.get_or_create_subscription(chat_id).await?;
                bot.send_message(msg.chat.id, format_subscription(&sub))
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Levels(value) => {
                let value = value.trim();
                let symbol = normalize_symbol(if value.is_empty() { "BTC" } else { value });
                let text = match self.find_session(&symbol).await {
                    Some(state) => format_levels(&symbol, &state),
                    None => format!("No levels yet for {}", escape(&symbol)),
                };
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Pause => {
                let mut sub = self.db.get_or_create_subscription(chat_id).await?;
                sub.enabled = false;
                self.db.update_subscription(&sub).await?;
                bot.send_message(msg.chat.id, "Alerts paused. Use /resume to re-enable.")
                    .await?;
            }

            Command::Resume => {
                let mut sub = self.db.get_or_create_subscription(chat_id).await?;
                sub.enabled = true;
                self.db.update_subscription(&sub).await?;
                bot.send_message(msg.chat.id, "Alerts resumed!").await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AlertSender for TelegramBot {
    async fn send(&self, message: &str, recipients: &[i64]) -> HashMap<i64, String> {
        let sends = recipients.iter().map(|&chat_id| async move {
            (chat_id, self.send_alert(chat_id, message).await)
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|(chat_id, result)| match result {
                Ok(()) => {
                    debug!(chat_id, "Alert delivered");
                    None
                }
                Err(e) => Some((chat_id, e.to_string())),
            })
            .collect()
    }
}

/// Parse an on/off argument.
fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "1" | "true" => Some(true),
        "off" | "no" | "0" | "false" => Some(false),
        _ => None,
    }
}

/// Split a comma or space separated symbol list.
fn parse_symbol_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Format price with appropriate precision based on magnitude.
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        return "$0".to_string();
    }
    let abs_price = price.abs();
    if abs_price >= 1000.0 {
        format!("${:.2}", price)
    } else if abs_price >= 1.0 {
        format!("${:.4}", price)
    } else if abs_price >= 0.01 {
        format!("${:.6}", price)
    } else {
        format!("${:.8}", price)
    }
}

fn format_close_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn breach_headline(level: LevelName) -> &'static str {
    match level {
        LevelName::PivotUp => "reclaimed the pivot",
        LevelName::PivotDown => "lost the pivot",
        level if level.direction() == BreachDirection::Up => "broke above",
        _ => "broke below",
    }
}

/// Render a level alert as Telegram HTML.
pub fn format_level_alert(alert: &LevelAlert) -> String {
    let level = alert.level();
    let arrow = match alert.breach.direction {
        BreachDirection::Up => "📈",
        BreachDirection::Down => "📉",
    };
    let level_label = if level.is_pivot() { "P" } else { level.as_str() };

    let mut msg = format!(
        "{} <b>{} {} {}</b>\n\n\
         <b>Level:</b> {} ({})\n\
         <b>Price:</b> {}\n\
         <b>Momentum:</b> {} {} (score {})",
        arrow,
        escape(&alert.symbol),
        breach_headline(level),
        level_label,
        level.as_str(),
        format_price(alert.breach.level_price),
        format_price(alert.breach.price),
        alert.momentum.emoji(),
        alert.momentum.label,
        alert.momentum.score,
    );

    for reason in alert.momentum.top_reasons(3) {
        msg.push_str(&format!("\n  • {}", escape(reason)));
    }

    if let Some(divergence) = &alert.divergence {
        msg.push_str(&format!(
            "\n<b>Divergence:</b> {} ({})",
            divergence.kind,
            escape(&divergence.description)
        ));
    }

    if !alert.targets.is_empty() {
        let targets: Vec<String> = alert.targets.iter().map(|t| format_price(*t)).collect();
        msg.push_str(&format!("\n<b>Targets:</b> {}", targets.join(" → ")));
    }

    for line in format_indicators(&alert.indicators) {
        msg.push('\n');
        msg.push_str(&line);
    }

    msg.push_str(&format!(
        "\n\n⏰ Session from {}",
        format_close_time(alert.session_close_time)
    ));
    msg
}

/// Indicator lines for an alert. Readings still at their neutral zero are skipped.
fn format_indicators(ind: &IndicatorSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    let mut oscillators = vec![format!("RSI {:.1}", ind.rsi), format!("MFI {:.1}", ind.mfi)];
    if ind.adx > 0.0 {
        oscillators.push(format!("ADX {:.1}", ind.adx));
    }
    lines.push(format!("<b>Oscillators:</b> {}", oscillators.join(" · ")));

    if ind.macd != 0.0 || ind.macd_signal != 0.0 {
        lines.push(format!(
            "<b>MACD:</b> {:.2} / signal {:.2} (hist {:+.2})",
            ind.macd, ind.macd_signal, ind.macd_hist
        ));
    }
    if ind.bb_middle > 0.0 {
        lines.push(format!(
            "<b>Bollinger:</b> {} / {} / {}",
            format_price(ind.bb_lower),
            format_price(ind.bb_middle),
            format_price(ind.bb_upper)
        ));
    }
    if ind.atr > 0.0 {
        lines.push(format!("<b>ATR:</b> {}", format_price(ind.atr)));
    }
    if ind.volume_sma > 0.0 {
        lines.push(format!(
            "<b>Volume:</b> {:.2}x the 20-candle average ({:.2})",
            ind.volume_ratio, ind.volume_sma
        ));
    }
    lines
}

/// Render a chat's settings.
pub fn format_subscription(sub: &Subscription) -> String {
    format!(
        "<b>Current Settings</b>\n\n\
         Status: {}\n\
         BTC alerts: {}\n\
         Watching: {}",
        if sub.enabled { "Active" } else { "Paused" },
        if sub.btc_alerts { "On" } else { "Off" },
        if sub.symbols.is_empty() {
            "Nothing".to_string()
        } else {
            sub.symbols.join(", ")
        }
    )
}

/// Render a symbol's current session ladder.
pub fn format_levels(symbol: &str, state: &SessionState) -> String {
    let ladder = &state.levels.ladder;
    let mark = |level: LevelName| if state.is_alerted(level) { " ✅" } else { "" };

    let mut msg = format!(
        "<b>{} pivot levels</b>\n\
         Session from {}\n\n\
         R3: {}{}\n\
         R2: {}{}\n\
         R1: {}{}\n\
         P: {}\n\
         S1: {}{}\n\
         S2: {}{}\n\
         S3: {}{}\n\n\
         <b>Price:</b> {}",
        escape(symbol),
        format_close_time(state.last_candle_time),
        format_price(ladder.r3),
        mark(LevelName::R3),
        format_price(ladder.r2),
        mark(LevelName::R2),
        format_price(ladder.r1),
        mark(LevelName::R1),
        format_price(ladder.p),
        format_price(ladder.s1),
        mark(LevelName::S1),
        format_price(ladder.s2),
        mark(LevelName::S2),
        format_price(ladder.s3),
        mark(LevelName::S3),
        format_price(state.levels.current_price),
    );

    if !state.alerted_levels.is_empty() {
        let alerted: Vec<&str> = state.alerted_levels.iter().map(|l| l.as_str()).collect();
        msg.push_str(&format!("\n<b>Alerted:</b> {}", alerted.join(", ")));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivotbot_core::{
        DivergenceEvent, DivergenceKind, IndicatorSnapshot, MomentumLabel, MomentumSignal,
        PivotLadder,
    };
    use pivotbot_engine::LevelBreach;

    fn ladder() -> PivotLadder {
        PivotLadder {
            p: 69500.0,
            r1: 70000.0,
            r2: 70500.0,
            r3: 71000.0,
            s1: 69000.0,
            s2: 68500.0,
            s3: 68000.0,
            close_time: 86_399_999,
        }
    }

    fn alert(level: LevelName, price: f64) -> LevelAlert {
        let l = ladder();
        let breach = LevelBreach {
            level,
            level_price: level.price_in(&l),
            price,
            direction: level.direction(),
        };
        let momentum = MomentumSignal {
            label: MomentumLabel::StrongBull,
            score: 9,
            reasons: vec![
                "RSI 65.0 strong".to_string(),
                "MACD histogram expanding bullish".to_string(),
                "Price above SMA50 > SMA200 (uptrend)".to_string(),
                "Volume 1.5x average".to_string(),
            ],
        };
        let divergence = Some(DivergenceEvent {
            kind: DivergenceKind::Bullish,
            description: "RSI recovering".to_string(),
        });
        let snapshot = IndicatorSnapshot {
            rsi: 65.0,
            macd: 210.5,
            macd_signal: 180.25,
            macd_hist: 30.25,
            atr: 850.0,
            bb_upper: 71200.0,
            bb_middle: 69800.0,
            bb_lower: 68400.0,
            mfi: 58.0,
            adx: 27.5,
            volume_sma: 1200.0,
            volume_ratio: 1.5,
            ..Default::default()
        };
        LevelAlert::new("BTCUSDT", breach, &l, &snapshot, momentum, divergence)
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.0), "$0");
        assert_eq!(format_price(70080.0), "$70080.00");
        assert_eq!(format_price(1.5), "$1.5000");
        assert_eq!(format_price(0.05), "$0.050000");
        assert_eq!(format_price(0.00001234), "$0.00001234");
    }

    #[test]
    fn test_format_level_alert() {
        let msg = format_level_alert(&alert(LevelName::R1, 70080.0));
        assert!(msg.contains("BTCUSDT broke above R1"));
        assert!(msg.contains("<b>Level:</b> R1 ($70000.00)"));
        assert!(msg.contains("<b>Price:</b> $70080.00"));
        assert!(msg.contains("STRONG_BULL (score 9)"));
        // top three reasons only, HTML escaped
        assert!(msg.contains("SMA50 &gt; SMA200"));
        assert!(!msg.contains("Volume 1.5x"));
        assert!(msg.contains("BULLISH"));
        assert!(msg.contains("$70500.00 → $71000.00"));
        assert!(msg.contains("1970-01-01 23:59 UTC"));
    }

    #[test]
    fn test_format_level_alert_indicators() {
        let msg = format_level_alert(&alert(LevelName::R1, 70080.0));
        assert!(msg.contains("<b>Oscillators:</b> RSI 65.0 · MFI 58.0 · ADX 27.5"));
        assert!(msg.contains("<b>MACD:</b> 210.50 / signal 180.25 (hist +30.25)"));
        assert!(msg.contains("<b>Bollinger:</b> $68400.00 / $69800.00 / $71200.00"));
        assert!(msg.contains("<b>ATR:</b> $850.00"));
        assert!(msg.contains("<b>Volume:</b> 1.50x the 20-candle average (1200.00)"));
    }

    #[test]
    fn test_neutral_indicators_are_skipped() {
        let snapshot = IndicatorSnapshot {
            rsi: 50.0,
            mfi: 50.0,
            ..Default::default()
        };
        let lines = format_indicators(&snapshot);
        assert_eq!(lines, vec!["<b>Oscillators:</b> RSI 50.0 · MFI 50.0".to_string()]);
    }

    #[test]
    fn test_format_pivot_alert() {
        let msg = format_level_alert(&alert(LevelName::PivotDown, 69400.0));
        assert!(msg.contains("lost the pivot P"));
        assert!(msg.contains("P_DOWN"));
        assert!(msg.contains("📉"));
    }

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle(" ON "), Some(true));
        assert_eq!(parse_toggle("off"), Some(false));
        assert_eq!(parse_toggle(""), None);
        assert_eq!(parse_toggle("maybe"), None);
    }

    #[test]
    fn test_parse_symbol_list() {
        assert_eq!(parse_symbol_list("btc, eth sol,,"), vec!["BTC", "ETH", "SOL"]);
        assert!(parse_symbol_list("  ").is_empty());
    }

    #[test]
    fn test_format_subscription() {
        let mut sub = Subscription::new(1);
        sub.watch(["ETH"]);
        let text = format_subscription(&sub);
        assert!(text.contains("Status: Active"));
        assert!(text.contains("BTC alerts: On"));
        assert!(text.contains("Watching: ETHUSDT"));
    }

    #[test]
    fn test_format_levels_marks_alerted() {
        let mut state = SessionState::new();
        state.rollover(86_399_999, ladder);
        state.set_current_price(70080.0);
        state.mark_alerted(LevelName::R1);

        let text = format_levels("BTCUSDT", &state);
        assert!(text.contains("R1: $70000.00 ✅"));
        assert!(text.contains("R2: $70500.00\n"));
        assert!(text.contains("<b>Alerted:</b> R1"));
    }
}
