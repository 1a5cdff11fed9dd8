use async_trait::async_trait;
use tracing::debug;

use crate::defs::MediaProcessor;
use crate::defs::MediaRef;
use crate::defs::MessageId;
use crate::defs::PublishPayload;
use crate::defs::Publisher;
use crate::defs::SourceMedia;

/// Publisher that accepts everything and sends nothing.
pub struct DiscardPublisher;

#[async_trait]
impl Publisher for DiscardPublisher {
    async fn publish(&self, payload: &PublishPayload) -> anyhow::Result<()> {
        debug!("Discarding payload for {}", payload.group_id);
        Ok(())
    }

    async fn delete(&self, message_id: MessageId) -> anyhow::Result<()> {
        debug!("Discarding delete for {}", message_id);
        Ok(())
    }
}

/// Media processor for runs without media storage. Every attachment ends up as a null reference.
pub struct NoMediaProcessor;

#[async_trait]
impl MediaProcessor for NoMediaProcessor {
    async fn process(&self, message_id: MessageId, _media: &SourceMedia) -> anyhow::Result<MediaRef> {
        anyhow::bail!("media processing disabled, dropping attachment of {}", message_id)
    }
}
