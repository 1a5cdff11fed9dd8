use crate::config::{FinalDrain, PipelineConfig};
use crate::payload::to_payload;
use crate::store::AggregationStore;
use crate::text_filter::TextFilter;
use crate::types::{ItemKey, PublishPayload, Publisher, TrackedItem};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Singles once READY, groups once READY and quiet for the quiescence delay.
    Regular,
    /// Shutdown pass: groups regardless of timing, per the configured [`FinalDrain`] policy.
    FinalDrain,
}

/// Periodically moves ready items out of the store and into the publisher.
pub struct FlushScheduler {
    store: Arc<dyn AggregationStore>,
    publisher: Arc<dyn Publisher>,
    filter: Arc<TextFilter>,
    config: PipelineConfig,
    emitted: Mutex<Vec<PublishPayload>>,
    pass_lock: tokio::sync::Mutex<()>,
}

impl FlushScheduler {
    pub fn new(
        store: Arc<dyn AggregationStore>,
        publisher: Arc<dyn Publisher>,
        filter: Arc<TextFilter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            filter,
            config,
            emitted: Mutex::new(Vec::new()),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_flushable(&self, item: &TrackedItem, now: Instant, mode: PassMode) -> bool {
        match (item, mode) {
            (TrackedItem::Single(message), _) => message.is_ready(),
            (TrackedItem::Group { .. }, PassMode::Regular) => {
                item.all_ready() && item.idle_for(now) >= self.config.quiescence_delay()
            }
            (TrackedItem::Group { .. }, PassMode::FinalDrain) => match self.config.final_drain {
                FinalDrain::IncludeUnready => true,
                FinalDrain::ReadyOnly => item.all_ready(),
            },
        }
    }

    /// One scan over the store. Returns how many items were emitted.
    pub async fn run_pass(&self, mode: PassMode) -> usize {
        let _pass = self.pass_lock.lock().await;
        let now = Instant::now();
        let mut flushed = 0;

        for key in self.store.scan() {
            let Some(item) = self.store.take_if(key, &|item: &TrackedItem| self.is_flushable(item, now, mode)) else {
                continue;
            };
            if mode == PassMode::FinalDrain && !item.all_ready() {
                warn!("Flushing {} with unfinished members at shutdown", key);
            }
            self.emit(key, to_payload(&item, &self.filter)).await;
            flushed += 1;
        }

        if flushed > 0 {
            debug!("{:?} pass flushed {} item(s), {} pending", mode, flushed, self.store.len());
        }
        flushed
    }

    async fn emit(&self, key: ItemKey, payload: PublishPayload) {
        match self.publisher.publish(&payload).await {
            Ok(()) => info!("Published {}", key),
            Err(e) => warn!("Error sending {} to API: {:#}", key, e),
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload);
    }

    /// Flushes on the configured interval until `done` flips, then drains: a few catch-up
    /// passes for groups still settling, and one final pass that ignores the quiescence delay.
    pub async fn run(&self, mut done: watch::Receiver<bool>) -> usize {
        let period = self.config.flush_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = 0;

        while !*done.borrow() {
            tokio::select! {
                _ = ticker.tick() => total += self.run_pass(PassMode::Regular).await,
                changed = done.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Ingestion finished, draining {} pending item(s)", self.store.len());
        for _ in 0..self.config.catch_up_passes {
            if self.store.is_empty() {
                break;
            }
            total += self.run_pass(PassMode::Regular).await;
            tokio::time::sleep(self.config.catch_up_interval()).await;
        }
        total += self.run_pass(PassMode::FinalDrain).await;

        let left = self.store.len();
        if left > 0 {
            warn!("{} item(s) never became ready and were not published", left);
        }
        total
    }

    /// Every payload emitted so far, in emission order.
    pub fn emitted(&self) -> Vec<PublishPayload> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
