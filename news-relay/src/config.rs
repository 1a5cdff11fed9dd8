use crate::types::{RelayError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Upper bound on the ids looked up on each side of an edited message.
pub const MAX_EDIT_NEIGHBORHOOD: i64 = 1_000;

/// Full runtime configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub source: SourceConfig,
    pub publisher: PublisherConfig,
    pub media: MediaConfig,
    pub filter: FilterConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub channel: String,
    /// Oldest day included in a history backfill.
    pub start_date: Option<NaiveDate>,
    pub output_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            start_date: None,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub create_url: Option<String>,
    pub delete_url: Option<String>,
    pub origin: Option<String>,
    pub timeout_seconds: u64,
    pub dry: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            create_url: None,
            delete_url: None,
            origin: None,
            timeout_seconds: 30,
            dry: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub image_path: PathBuf,
    pub video_path: PathBuf,
    pub preview_command: String,
    pub download_timeout_seconds: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from("media/images"),
            video_path: PathBuf::from("media/videos"),
            preview_command: "ffmpeg".to_string(),
            download_timeout_seconds: 120,
        }
    }
}

/// Which hashtag occurrence the cleaned text is cut after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashtagAnchor {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub hashtags: Vec<String>,
    pub anchor: HashtagAnchor,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            hashtags: [
                "#срочно",
                "#происшествия",
                "#дтп",
                "#лайфстайл",
                "#спорт",
                "#город",
                "#политика",
                "#развлечения",
                "#18+",
                "#топновости",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            anchor: HashtagAnchor::Last,
        }
    }
}

/// What the last pass at shutdown does with groups that still have unfinished members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinalDrain {
    /// Emit every remaining group, built from its READY members.
    #[default]
    IncludeUnready,
    /// Emit only groups whose members are all READY; the rest are dropped.
    ReadyOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quiescence_delay_ms: u64,
    pub flush_interval_ms: u64,
    pub catch_up_passes: u32,
    pub catch_up_interval_ms: u64,
    pub backfill_stagger_ms: u64,
    pub admission_delay_ms: u64,
    pub edit_neighborhood: i64,
    pub final_drain: FinalDrain,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quiescence_delay_ms: 3_000,
            flush_interval_ms: 5_000,
            catch_up_passes: 3,
            catch_up_interval_ms: 3_000,
            backfill_stagger_ms: 100,
            admission_delay_ms: 1_000,
            edit_neighborhood: 10,
            final_drain: FinalDrain::IncludeUnready,
        }
    }
}

impl PipelineConfig {
    pub fn quiescence_delay(&self) -> Duration {
        Duration::from_millis(self.quiescence_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn catch_up_interval(&self) -> Duration {
        Duration::from_millis(self.catch_up_interval_ms)
    }

    pub fn backfill_stagger(&self) -> Duration {
        Duration::from_millis(self.backfill_stagger_ms)
    }

    pub fn admission_delay(&self) -> Duration {
        Duration::from_millis(self.admission_delay_ms)
    }
}

impl RelayConfig {
    /// Reads and validates the file in one go. Use [`RelayConfig::read`] when overrides
    /// have to be applied before validation.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file without validating it.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config = Self::from_toml(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.channel.trim().is_empty() {
            return Err(RelayError::Config("source.channel is required".to_string()));
        }
        if self.filter.hashtags.is_empty() {
            return Err(RelayError::Config("filter.hashtags must not be empty".to_string()));
        }
        if self.filter.hashtags.iter().any(|h| h.trim().is_empty()) {
            return Err(RelayError::Config("filter.hashtags contains an empty entry".to_string()));
        }
        match &self.publisher.create_url {
            Some(url) => {
                Url::parse(url)?;
            }
            None if !self.publisher.dry => {
                return Err(RelayError::Config(
                    "publisher.create_url is required unless running dry".to_string(),
                ));
            }
            None => {}
        }
        if let Some(url) = &self.publisher.delete_url {
            Url::parse(url)?;
        }
        if self.pipeline.flush_interval_ms == 0 {
            return Err(RelayError::Config("pipeline.flush_interval_ms must be positive".to_string()));
        }
        if !(0..=MAX_EDIT_NEIGHBORHOOD).contains(&self.pipeline.edit_neighborhood) {
            return Err(RelayError::Config(format!(
                "pipeline.edit_neighborhood must be between 0 and {}",
                MAX_EDIT_NEIGHBORHOOD
            )));
        }
        Ok(())
    }

    /// Backfill output file, one per channel.
    pub fn output_path(&self) -> PathBuf {
        self.source.output_dir.join(format!("{}.json", self.source.channel))
    }
}
