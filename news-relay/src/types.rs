use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub use interfaces::defs::{GroupId, MediaKind, MediaRef, MessageId, PublishPayload, SourceEvent, SourceMedia, SourceMessage};
pub use interfaces::defs::{MediaProcessor, Publisher};

/// Processing state of a tracked message. Ordered so that transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemStatus {
    Created,
    DownloadingMedia,
    Ready,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Created => "CREATED",
            ItemStatus::DownloadingMedia => "DOWNLOADING",
            ItemStatus::Ready => "READY",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key. Singles and groups live in separate id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKey {
    Single(MessageId),
    Group(GroupId),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Single(id) => write!(f, "message {}", id),
            ItemKey::Group(id) => write!(f, "group {}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedMessage {
    pub id: MessageId,
    pub group_id: Option<GroupId>,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub media: Option<MediaRef>,
    pub status: ItemStatus,
    pub last_update: Instant,
    /// Distinguishes a redelivered or edited copy of the same id; the newer copy wins.
    pub created_at: Instant,
}

impl TrackedMessage {
    pub fn from_source(message: &SourceMessage) -> Self {
        let now = Instant::now();
        Self {
            id: message.id,
            group_id: message.group_id,
            date: message.date,
            text: message.text().map(str::to_string),
            media: None,
            status: ItemStatus::Created,
            last_update: now,
            created_at: now,
        }
    }

    pub fn key(&self) -> ItemKey {
        match self.group_id {
            Some(group_id) => ItemKey::Group(group_id),
            None => ItemKey::Single(self.id),
        }
    }

    /// Moves the status forward and refreshes `last_update`. Backward moves are ignored.
    pub fn advance(&mut self, status: ItemStatus) -> bool {
        if status < self.status {
            return false;
        }
        self.status = status;
        self.last_update = Instant::now();
        debug!("Updated status of message {} to {}", self.id, self.status);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.status == ItemStatus::Ready
    }
}

/// Unit held by the aggregation store.
#[derive(Debug, Clone)]
pub enum TrackedItem {
    Single(TrackedMessage),
    /// Members in the order their ingestion reached the store.
    Group { group_id: GroupId, members: Vec<TrackedMessage> },
}

impl TrackedItem {
    pub fn members(&self) -> &[TrackedMessage] {
        match self {
            TrackedItem::Single(message) => std::slice::from_ref(message),
            TrackedItem::Group { members, .. } => members,
        }
    }

    pub fn all_ready(&self) -> bool {
        self.members().iter().all(TrackedMessage::is_ready)
    }

    /// Most recent update across all members.
    pub fn last_update(&self) -> Option<Instant> {
        self.members().iter().map(|m| m.last_update).max()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        self.last_update()
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publisher rejected request: HTTP {status}: {body}")]
    Publish { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
