//! Alerting for pivot level crossings.
//!
//! This crate provides:
//! - Crash-safe JSON session state storage
//! - SQLite-based subscription registry
//! - Telegram bot integration for commands and alert delivery
//! - The per-group polling monitor tying feeds, engine and delivery together

pub mod config;
pub mod db;
pub mod monitor;
pub mod notifier;
pub mod registry;
pub mod store;
pub mod telegram;

pub use config::{SubscriberScope, Subscription};
pub use db::Database;
pub use monitor::{
    LevelMonitor, MonitorConfig, MonitorError, MonitorEvent, PollOutcome, SymbolScope,
};
pub use notifier::{AlertSender, DispatchReport, LevelAlert, Notifier, NotifierError};
pub use registry::SubscriberRegistry;
pub use store::{SessionStore, StoreError};
pub use telegram::TelegramBot;
pub use teloxide::utils::html::escape as escape_html;
