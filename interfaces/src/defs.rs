use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MessageId = i64;
pub type GroupId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Media attached to a source message, before it has been stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMedia {
    pub kind: MediaKind,
    /// Either an `http(s)` URL or a local file path.
    pub location: String,
    #[serde(default)]
    pub spoiler: bool,
}

/// A message as delivered by the channel source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: MessageId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<SourceMedia>,
}

impl SourceMessage {
    /// Empty strings count as "no text", the way the source reports captionless media.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Live notifications from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum SourceEvent {
    New { message: SourceMessage },
    Edited { message: SourceMessage },
    Deleted { ids: Vec<MessageId> },
}

/// Stored media handle produced by a [`MediaProcessor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub filename: String,
    pub spoiler: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl MediaRef {
    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }
}

/// Body sent to the publishing API on the create/update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPayload {
    /// Message id for singles, group id for groups.
    #[serde(rename = "groupID")]
    pub group_id: i64,
    pub date: String,
    pub text: String,
    pub media: Vec<Option<MediaRef>>,
}

/// Downstream publishing API.
///
/// Failures are reported but never retried by the caller.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: &PublishPayload) -> anyhow::Result<()>;

    async fn delete(&self, message_id: MessageId) -> anyhow::Result<()>;
}

/// Turns raw message media into a stored file reference.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn process(&self, message_id: MessageId, media: &SourceMedia) -> anyhow::Result<MediaRef>;
}
