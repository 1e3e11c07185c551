//! SQLite database for chat subscriptions.

use crate::config::{SubscriberScope, Subscription};
use crate::registry::SubscriberRegistry;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Subscription not found for chat: {0}")]
    SubscriptionNotFound(i64),
}

type SubscriptionRow = (i64, i64, bool, String, bool);

fn subscription_from_row(
    (id, chat_id, btc_alerts, symbols_json, enabled): SubscriptionRow,
) -> Subscription {
    let symbols: Vec<String> = serde_json::from_str(&symbols_json).unwrap_or_default();
    Subscription {
        id,
        chat_id,
        btc_alerts,
        symbols,
        enabled,
    }
}

/// Database connection for subscriptions.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // every connection to :memory: opens its own empty database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL UNIQUE,
                btc_alerts INTEGER NOT NULL DEFAULT 1,
                symbols TEXT NOT NULL DEFAULT '[]',
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a chat's subscription, if registered.
    pub async fn get_subscription(&self, chat_id: i64) -> Result<Option<Subscription>, DbError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, chat_id, btc_alerts, symbols, enabled FROM subscriptions WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(subscription_from_row))
    }

    /// Get or create the subscription for a chat.
    pub async fn get_or_create_subscription(&self, chat_id: i64) -> Result<Subscription, DbError> {
        if let Some(existing) = self.get_subscription(chat_id).await? {
            return Ok(existing);
        }

        let result = sqlx::query("INSERT INTO subscriptions (chat_id) VALUES (?)")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(Subscription {
            id: result.last_insert_rowid(),
            ..Subscription::new(chat_id)
        })
    }

    /// Update a subscription.
    pub async fn update_subscription(&self, sub: &Subscription) -> Result<(), DbError> {
        let symbols_json = serde_json::to_string(&sub.symbols).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET btc_alerts = ?, symbols = ?, enabled = ?
            WHERE chat_id = ?
            "#,
        )
        .bind(sub.btc_alerts)
        .bind(&symbols_json)
        .bind(sub.enabled)
        .bind(sub.chat_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::SubscriptionNotFound(sub.chat_id));
        }
        Ok(())
    }

    /// Get all enabled subscriptions.
    pub async fn enabled_subscriptions(&self) -> Result<Vec<Subscription>, DbError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, chat_id, btc_alerts, symbols, enabled FROM subscriptions WHERE enabled = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(subscription_from_row).collect())
    }
}

#[async_trait]
impl SubscriberRegistry for Database {
    async fn subscribers_for(
        &self,
        scope: SubscriberScope,
        symbol: &str,
    ) -> Result<Vec<i64>, DbError> {
        let subs = self.enabled_subscriptions().await?;
        Ok(subs
            .into_iter()
            .filter(|sub| sub.wants(scope, symbol))
            .map(|sub| sub.chat_id)
            .collect())
    }

    async fn watched_symbols(&self) -> Result<Vec<String>, DbError> {
        let subs = self.enabled_subscriptions().await?;
        let symbols: BTreeSet<String> = subs.into_iter().flat_map(|sub| sub.symbols).collect();
        Ok(symbols.into_iter().collect())
    }
}
