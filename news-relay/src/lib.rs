pub mod types;
pub mod config;
pub mod traits;
pub mod text_filter;
pub mod store;
pub mod payload;
pub mod ingest;
pub mod scheduler;
pub mod publisher;
pub mod media;
pub mod sources;
pub mod relay;
pub mod restart;

pub use types::*;
pub use config::{
    FilterConfig, FinalDrain, HashtagAnchor, MediaConfig, PipelineConfig, PublisherConfig, RelayConfig, SourceConfig,
    MAX_EDIT_NEIGHBORHOOD,
};
pub use text_filter::TextFilter;
pub use store::{Admission, AggregationStore, MemoryStore};
pub use ingest::{IngestOutcome, Ingestor};
pub use scheduler::{FlushScheduler, PassMode};
pub use publisher::{DryRunPublisher, HttpPublisher};
pub use media::{FfmpegPreview, FileMediaProcessor, PreviewExtractor};
pub use sources::{JsonlEventStream, JsonlHistory};
pub use relay::Relay;
pub use restart::RestartPolicy;
