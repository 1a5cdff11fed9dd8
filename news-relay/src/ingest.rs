use crate::config::{PipelineConfig, MAX_EDIT_NEIGHBORHOOD};
use crate::store::{Admission, AggregationStore};
use crate::text_filter::TextFilter;
use crate::traits::{EventStream, MessageLookup, MessageSource};
use crate::types::{
    ItemKey, ItemStatus, MediaProcessor, MessageId, Publisher, Result, SourceEvent, SourceMessage, TrackedMessage,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What happened to a message offered to [`Ingestor::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted(ItemKey),
    /// Neither text nor group id.
    Empty,
    /// Text without any configured hashtag.
    Filtered,
    IgnoredGroup,
    /// A newer copy of the same message is already tracked.
    Superseded,
    /// Group sibling rediscovered by an edit that never left the store.
    AlreadyTracked,
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted(_))
    }
}

/// Turns source messages into tracked items and drives them to READY.
pub struct Ingestor {
    store: Arc<dyn AggregationStore>,
    filter: Arc<TextFilter>,
    media: Arc<dyn MediaProcessor>,
    publisher: Arc<dyn Publisher>,
    lookup: Option<Arc<dyn MessageLookup>>,
    config: PipelineConfig,
    events_handled: AtomicU64,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn AggregationStore>,
        filter: Arc<TextFilter>,
        media: Arc<dyn MediaProcessor>,
        publisher: Arc<dyn Publisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            filter,
            media,
            publisher,
            lookup: None,
            config,
            events_handled: AtomicU64::new(0),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn MessageLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub async fn ingest(&self, message: SourceMessage) -> IngestOutcome {
        self.ingest_with(message, false).await
    }

    /// With `absent_only`, a message whose id is still tracked is left untouched. The check
    /// happens at admission, after the admission delay.
    async fn ingest_with(&self, message: SourceMessage, absent_only: bool) -> IngestOutcome {
        let group_id = message.group_id;

        if message.text().is_none() && group_id.is_none() {
            debug!("Message {} has neither text nor group, skipping", message.id);
            return IngestOutcome::Empty;
        }

        if !self.filter.accepts(message.text()) {
            if let Some(group_id) = group_id {
                if let Some(evicted) = self.store.ignore_group(group_id) {
                    info!(
                        "Evicted {} buffered member(s) of ignored group {}",
                        evicted.members().len(),
                        group_id
                    );
                }
            }
            info!(
                "No valid hashtags found for message {}. Group ID {:?} ignored.",
                message.id, group_id
            );
            return IngestOutcome::Filtered;
        }

        // Gives a caption-bearing sibling processed in parallel the chance to mark the group first.
        let admission_delay = self.config.admission_delay();
        if !admission_delay.is_zero() {
            tokio::time::sleep(admission_delay).await;
        }

        let tracked = TrackedMessage::from_source(&message);
        let key = tracked.key();
        let created_at = tracked.created_at;

        let admission = if absent_only {
            self.store.admit_absent(tracked)
        } else {
            self.store.admit(tracked)
        };
        if !admission.is_admitted() {
            return match admission {
                Admission::Ignored => {
                    info!("Group {:?} is likely an ad post, dropping message {}", group_id, message.id);
                    IngestOutcome::IgnoredGroup
                }
                Admission::AlreadyTracked => {
                    debug!("Message {} is still pending, not re-ingesting it", message.id);
                    IngestOutcome::AlreadyTracked
                }
                _ => {
                    debug!("Message {} superseded by a newer copy", message.id);
                    IngestOutcome::Superseded
                }
            };
        }
        debug!("Message {} admitted to {} ({:?})", message.id, key, admission);

        let mut media_ref = None;
        if let Some(media) = &message.media {
            self.store.modify(key, message.id, created_at, &mut |m: &mut TrackedMessage| {
                m.advance(ItemStatus::DownloadingMedia);
            });
            media_ref = match self.media.process(message.id, media).await {
                Ok(media_ref) => Some(media_ref),
                Err(e) => {
                    warn!("Failed to process media for message {}: {:#}", message.id, e);
                    None
                }
            };
        }

        let updated = self.store.modify(key, message.id, created_at, &mut |m: &mut TrackedMessage| {
            m.media = media_ref.take();
            m.advance(ItemStatus::Ready);
        });
        if !updated {
            debug!("Message {} left the store before it became ready", message.id);
        }

        IngestOutcome::Accepted(key)
    }

    /// Re-ingests an edited message. For group members, the neighbourhood of ids around it is
    /// re-read so siblings that are no longer tracked come back with it.
    pub async fn handle_edit(&self, message: SourceMessage) -> Result<usize> {
        let Some(group_id) = message.group_id else {
            return Ok(self.ingest(message).await.is_accepted() as usize);
        };
        let Some(lookup) = &self.lookup else {
            warn!("No lookup configured, re-ingesting edited message {} alone", message.id);
            return Ok(self.ingest(message).await.is_accepted() as usize);
        };

        let span = self.config.edit_neighborhood.clamp(0, MAX_EDIT_NEIGHBORHOOD);
        let ids: Vec<MessageId> = (message.id.saturating_sub(span)..=message.id.saturating_add(span))
            .filter(|id| *id > 0 && *id != message.id)
            .collect();
        // Residency is decided at admission: a group flushed while the edit waits out the
        // admission delay gets all of its siblings back.
        let siblings: Vec<SourceMessage> = lookup
            .lookup(&ids)
            .await?
            .into_iter()
            .filter(|m| m.group_id == Some(group_id))
            .collect();

        info!(
            "Edit of message {} in group {}: checking {} sibling(s)",
            message.id,
            group_id,
            siblings.len()
        );

        let ingestions = std::iter::once(self.ingest_with(message, false))
            .chain(siblings.into_iter().map(|m| self.ingest_with(m, true)));
        let outcomes = futures::future::join_all(ingestions).await;
        Ok(outcomes.iter().filter(|o| o.is_accepted()).count())
    }

    /// Drops any pending copy of the ids and always forwards the delete downstream.
    pub async fn handle_delete(&self, ids: &[MessageId]) {
        for id in ids {
            if self.store.remove_message(*id) {
                info!("Dropped pending message {} before it was published", id);
            }
            match self.publisher.delete(*id).await {
                Ok(()) => info!("Deleted message {} downstream", id),
                Err(e) => warn!("Failed to delete message {}: {:#}", id, e),
            }
        }
    }

    pub async fn handle_event(&self, event: SourceEvent) {
        match event {
            SourceEvent::New { message } => {
                self.ingest(message).await;
            }
            SourceEvent::Edited { message } => {
                let id = message.id;
                if let Err(e) = self.handle_edit(message).await {
                    warn!("Failed to propagate edit of message {}: {}", id, e);
                }
            }
            SourceEvent::Deleted { ids } => self.handle_delete(&ids).await,
        }
    }

    /// Ingests the channel history, one task per message, staggered to keep rough chronological order.
    pub async fn backfill(self: &Arc<Self>, source: &dyn MessageSource, since: Option<DateTime<Utc>>) -> Result<usize> {
        let messages = source.history(since).await?;
        info!(
            "{} messages from {} are downloaded and ready for processing",
            messages.len(),
            source.source_name()
        );

        let stagger = self.config.backfill_stagger();
        let mut tasks = JoinSet::new();
        for message in messages {
            let ingestor = Arc::clone(self);
            tasks.spawn(async move { ingestor.ingest(message).await });
            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
        }

        let mut accepted = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) if outcome.is_accepted() => accepted += 1,
                Ok(_) => {}
                Err(e) => warn!("Ingestion task failed: {}", e),
            }
        }
        Ok(accepted)
    }

    /// Runs [`Ingestor::backfill`] and signals completion on `done` whatever the outcome.
    pub async fn run_backfill(
        self: Arc<Self>,
        source: Arc<dyn MessageSource>,
        since: Option<DateTime<Utc>>,
        done: watch::Sender<bool>,
    ) -> usize {
        let accepted = match self.backfill(source.as_ref(), since).await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Error fetching messages: {}", e);
                0
            }
        };
        let _ = done.send(true);
        accepted
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled.load(Ordering::Relaxed)
    }

    /// Processes live events one at a time until the stream ends or fails.
    pub async fn run_live(&self, events: &mut dyn EventStream) -> Result<()> {
        while let Some(event) = events.next_event().await? {
            debug!("Received event {:?}", event);
            self.handle_event(event).await;
            self.events_handled.fetch_add(1, Ordering::Relaxed);
        }
        info!("Event stream ended");
        Ok(())
    }
}
