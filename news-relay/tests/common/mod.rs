#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use news_relay::{
    FlushScheduler, HashtagAnchor, Ingestor, MediaKind, MediaProcessor, MediaRef, MemoryStore, MessageId,
    PipelineConfig, PublishPayload, Publisher, SourceMedia, SourceMessage, TextFilter,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const HASHTAGS: &[&str] = &["#news", "#sport"];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn filter() -> Arc<TextFilter> {
    Arc::new(TextFilter::new(
        HASHTAGS.iter().map(|h| h.to_string()).collect(),
        HashtagAnchor::Last,
    ))
}

/// Pipeline timings with the artificial delays switched off.
pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        admission_delay_ms: 0,
        backfill_stagger_ms: 0,
        ..Default::default()
    }
}

pub fn date_of(id: MessageId) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(id)
}

pub fn message(id: MessageId, group_id: Option<i64>, text: Option<&str>) -> SourceMessage {
    SourceMessage {
        id,
        group_id,
        date: date_of(id),
        text: text.map(str::to_string),
        media: None,
    }
}

pub fn with_media(mut message: SourceMessage, kind: MediaKind) -> SourceMessage {
    message.media = Some(SourceMedia {
        kind,
        location: format!("https://cdn.example.com/{}.bin", message.id),
        spoiler: false,
    });
    message
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishPayload>>,
    deleted: Mutex<Vec<MessageId>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<PublishPayload> {
        self.published.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, payload: &PublishPayload) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(payload.clone());
        if self.fail {
            anyhow::bail!("HTTP 502: bad gateway");
        }
        Ok(())
    }

    async fn delete(&self, message_id: MessageId) -> anyhow::Result<()> {
        self.deleted.lock().unwrap().push(message_id);
        if self.fail {
            anyhow::bail!("HTTP 502: bad gateway");
        }
        Ok(())
    }
}

/// Media processor that pretends to download for `delay`.
pub struct StubMedia {
    delay: Duration,
    fail: bool,
}

impl StubMedia {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: true,
        }
    }
}

#[async_trait]
impl MediaProcessor for StubMedia {
    async fn process(&self, message_id: MessageId, media: &SourceMedia) -> anyhow::Result<MediaRef> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("download of {} failed", media.location);
        }
        let (filename, preview) = match media.kind {
            MediaKind::Video => (format!("{}.mp4", message_id), Some(format!("{}.jpg", message_id))),
            _ => (format!("{}.jpg", message_id), None),
        };
        Ok(MediaRef {
            filename,
            spoiler: media.spoiler,
            preview,
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub ingestor: Arc<Ingestor>,
    pub scheduler: FlushScheduler,
}

pub fn harness() -> Harness {
    harness_with(StubMedia::instant(), RecordingPublisher::default(), pipeline_config())
}

pub fn harness_with(media: StubMedia, publisher: RecordingPublisher, config: PipelineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(publisher);
    let filter = filter();
    let ingestor = Ingestor::new(
        store.clone(),
        filter.clone(),
        Arc::new(media),
        publisher.clone(),
        config.clone(),
    );
    let scheduler = FlushScheduler::new(store.clone(), publisher.clone(), filter, config);
    Harness {
        store,
        publisher,
        ingestor: Arc::new(ingestor),
        scheduler,
    }
}
