//! Subscriber lookup capability.

use crate::config::SubscriberScope;
use crate::db::DbError;
use async_trait::async_trait;

/// Who should receive alerts, and which symbols anyone is watching.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Enabled chats subscribed to `symbol` in `scope`.
    async fn subscribers_for(
        &self,
        scope: SubscriberScope,
        symbol: &str,
    ) -> Result<Vec<i64>, DbError>;

    /// Union of every enabled chat's watch list, sorted and deduplicated.
    async fn watched_symbols(&self) -> Result<Vec<String>, DbError>;
}
