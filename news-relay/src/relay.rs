use crate::config::RelayConfig;
use crate::ingest::Ingestor;
use crate::media::FileMediaProcessor;
use crate::publisher::{DryRunPublisher, HttpPublisher};
use crate::scheduler::FlushScheduler;
use crate::store::{AggregationStore, MemoryStore};
use crate::text_filter::TextFilter;
use crate::traits::{EventStream, MessageLookup, MessageSource};
use crate::types::{MediaProcessor, PublishPayload, Publisher, Result};
use chrono::{DateTime, NaiveTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Wires the store, ingestor and flush scheduler together for one channel.
pub struct Relay {
    config: RelayConfig,
    store: Arc<dyn AggregationStore>,
    ingestor: Arc<Ingestor>,
    scheduler: Arc<FlushScheduler>,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        publisher: Arc<dyn Publisher>,
        media: Arc<dyn MediaProcessor>,
        lookup: Option<Arc<dyn MessageLookup>>,
    ) -> Self {
        let store: Arc<dyn AggregationStore> = Arc::new(MemoryStore::new());
        let filter = Arc::new(TextFilter::from_config(&config.filter));

        let mut ingestor = Ingestor::new(
            store.clone(),
            filter.clone(),
            media,
            publisher.clone(),
            config.pipeline.clone(),
        );
        if let Some(lookup) = lookup {
            ingestor = ingestor.with_lookup(lookup);
        }
        let scheduler = FlushScheduler::new(store.clone(), publisher, filter, config.pipeline.clone());

        Self {
            config,
            store,
            ingestor: Arc::new(ingestor),
            scheduler: Arc::new(scheduler),
        }
    }

    /// Builds the production collaborators: HTTP (or dry-run) publisher and on-disk media storage.
    pub async fn from_config(config: RelayConfig, lookup: Option<Arc<dyn MessageLookup>>) -> Result<Self> {
        let publisher: Arc<dyn Publisher> = if config.publisher.dry {
            info!("Dry run: nothing will be sent to the API");
            Arc::new(DryRunPublisher)
        } else {
            Arc::new(HttpPublisher::new(&config.publisher)?)
        };
        let media = FileMediaProcessor::new(&config.media)?;
        media.ensure_dirs().await?;

        Ok(Self::new(config, publisher, Arc::new(media), lookup))
    }

    pub fn store(&self) -> &Arc<dyn AggregationStore> {
        &self.store
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn scheduler(&self) -> &Arc<FlushScheduler> {
        &self.scheduler
    }

    /// Live events handled since this relay was built, across restarts.
    pub fn events_handled(&self) -> u64 {
        self.ingestor.events_handled()
    }

    fn since(&self) -> Option<DateTime<Utc>> {
        self.config
            .source
            .start_date
            .map(|day| day.and_time(NaiveTime::MIN).and_utc())
    }

    /// Backfills the channel history while flushing, then drains and writes the output file.
    pub async fn run_history(&self, source: Arc<dyn MessageSource>) -> Result<Vec<PublishPayload>> {
        info!("Starting history backfill of {}", self.config.source.channel);
        let (done_tx, done_rx) = watch::channel(false);

        let ingestion = self.ingestor.clone().run_backfill(source, self.since(), done_tx);
        let flushing = self.scheduler.run(done_rx);
        let (accepted, flushed) = tokio::join!(ingestion, flushing);
        info!("Backfill accepted {} message(s) and flushed {} item(s)", accepted, flushed);

        let emitted = self.scheduler.emitted();
        let output = self.config.output_path();
        write_output(&emitted, &output).await?;
        info!("Wrote {} payload(s) to {}", emitted.len(), output.display());
        Ok(emitted)
    }

    /// Handles live events until the stream ends or fails; pending items are drained either way.
    pub async fn run_live(&self, events: &mut dyn EventStream) -> Result<()> {
        info!("Listening for new messages on {}", self.config.source.channel);
        let (done_tx, done_rx) = watch::channel(false);

        let listening = async move {
            let result = self.ingestor.run_live(events).await;
            let _ = done_tx.send(true);
            result
        };
        let (result, flushed) = tokio::join!(listening, self.scheduler.run(done_rx));
        info!("Live session flushed {} item(s)", flushed);
        result
    }
}

/// Serialises the emitted payloads as one JSON array.
pub async fn write_output(payloads: &[PublishPayload], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec(payloads)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
