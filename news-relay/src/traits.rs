use crate::types::{MessageId, Result, SourceEvent, SourceMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Historical messages of the channel.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human-readable name for logs
    fn source_name(&self) -> String;

    /// Messages dated at or after `since`, oldest first.
    async fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SourceMessage>>;
}

/// Narrow by-id lookup, used to rediscover the siblings of an edited group member.
#[async_trait]
pub trait MessageLookup: Send + Sync {
    /// Returns the messages that exist among `ids`; unknown ids are skipped.
    async fn lookup(&self, ids: &[MessageId]) -> Result<Vec<SourceMessage>>;
}

/// Live notifications in arrival order.
#[async_trait]
pub trait EventStream: Send {
    /// `Ok(None)` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<SourceEvent>>;
}
