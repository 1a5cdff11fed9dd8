use crate::config::MediaConfig;
use crate::types::{MediaKind, MediaProcessor, MediaRef, MessageId, RelayError, Result, SourceMedia};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PARTIAL_SUFFIX: &str = ".part";

/// Produces a still preview for a stored video.
#[async_trait]
pub trait PreviewExtractor: Send + Sync {
    async fn extract(&self, video: &Path, output: &Path) -> Result<()>;
}

/// Grabs the first frame with an external `ffmpeg`.
pub struct FfmpegPreview {
    command: String,
}

impl FfmpegPreview {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl PreviewExtractor for FfmpegPreview {
    async fn extract(&self, video: &Path, output: &Path) -> Result<()> {
        let status = Command::new(&self.command)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(video)
            .args(["-frames:v", "1"])
            .arg(output)
            .status()
            .await?;
        if !status.success() {
            return Err(RelayError::Media(format!(
                "{} exited with {} extracting a frame from {}",
                self.command,
                status,
                video.display()
            )));
        }
        Ok(())
    }
}

/// Stores attachments as `{message_id}{ext}` under the image or video directory.
pub struct FileMediaProcessor {
    image_dir: PathBuf,
    video_dir: PathBuf,
    client: Client,
    preview: Arc<dyn PreviewExtractor>,
}

impl FileMediaProcessor {
    pub fn new(config: &MediaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()?;
        Ok(Self {
            image_dir: config.image_path.clone(),
            video_dir: config.video_path.clone(),
            client,
            preview: Arc::new(FfmpegPreview::new(config.preview_command.clone())),
        })
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewExtractor>) -> Self {
        self.preview = preview;
        self
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.image_dir).await?;
        fs::create_dir_all(&self.video_dir).await?;
        Ok(())
    }

    fn dir_for(&self, kind: MediaKind) -> Option<&Path> {
        match kind {
            MediaKind::Image => Some(self.image_dir.as_path()),
            MediaKind::Video => Some(self.video_dir.as_path()),
            MediaKind::Other => None,
        }
    }

    async fn download(&self, message_id: MessageId, media: &SourceMedia, dir: &Path) -> Result<String> {
        let filename = stored_filename(message_id, &media.location);
        let destination = dir.join(&filename);
        let partial = dir.join(format!("{}{}", filename, PARTIAL_SUFFIX));

        let fetched = self.fetch_into(&media.location, &partial).await;
        let moved = match fetched {
            Ok(()) => fs::rename(&partial, &destination).await.map_err(RelayError::from),
            Err(e) => Err(e),
        };
        if fs::try_exists(&partial).await.unwrap_or(false) {
            if let Err(e) = fs::remove_file(&partial).await {
                warn!("Failed to clean up {}: {}", partial.display(), e);
            }
        }
        moved?;

        info!("Downloaded media to {}", destination.display());
        Ok(filename)
    }

    async fn fetch_into(&self, location: &str, target: &Path) -> Result<()> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let bytes = self
                .client
                .get(location)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            fs::write(target, &bytes).await?;
        } else {
            fs::copy(location, target).await?;
        }
        Ok(())
    }

    async fn generate_preview(&self, filename: &str) -> Result<String> {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let preview_name = format!("{}.jpg", stem);
        let preview_path = self.image_dir.join(&preview_name);
        if fs::try_exists(&preview_path).await.unwrap_or(false) {
            debug!("Preview {} already exists", preview_name);
            return Ok(preview_name);
        }
        self.preview
            .extract(&self.video_dir.join(filename), &preview_path)
            .await?;
        Ok(preview_name)
    }
}

#[async_trait]
impl MediaProcessor for FileMediaProcessor {
    async fn process(&self, message_id: MessageId, media: &SourceMedia) -> anyhow::Result<MediaRef> {
        let dir = self
            .dir_for(media.kind)
            .ok_or_else(|| RelayError::Media(format!("unsupported media kind on message {}", message_id)))?;

        let filename = match find_downloaded(message_id, &[self.video_dir.as_path(), self.image_dir.as_path()]).await? {
            Some(existing) => {
                info!("Skipped downloading {}", existing);
                existing
            }
            None => self.download(message_id, media, dir).await?,
        };

        let preview = if media.kind == MediaKind::Video {
            match self.generate_preview(&filename).await {
                Ok(preview) => Some(preview),
                Err(e) => {
                    warn!("Failed to generate preview for {}: {}", filename, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(MediaRef {
            filename,
            spoiler: media.spoiler,
            preview,
        })
    }
}

/// `{message_id}` plus the extension of the source location, if it has one.
pub fn stored_filename(message_id: MessageId, location: &str) -> String {
    let path = url::Url::parse(location)
        .ok()
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| location.to_string());
    match Path::new(&path).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", message_id, ext),
        _ => message_id.to_string(),
    }
}

/// First `{message_id}` or `{message_id}.*` file found in `dirs`, searched in order.
pub async fn find_downloaded(message_id: MessageId, dirs: &[&Path]) -> Result<Option<String>> {
    let bare = message_id.to_string();
    let prefix = format!("{}.", bare);
    for dir in dirs {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let stored = name == bare || (name.starts_with(&prefix) && !name.ends_with(PARTIAL_SUFFIX));
            if stored {
                return Ok(Some(name));
            }
        }
    }
    Ok(None)
}
