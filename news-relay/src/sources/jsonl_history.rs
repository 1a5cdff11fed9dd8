use crate::traits::{MessageLookup, MessageSource};
use crate::types::{MessageId, RelayError, Result, SourceMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Channel export stored as JSON lines, one [`SourceMessage`] per line.
///
/// Also answers by-id lookups, which is what edit handling needs to find group siblings.
pub struct JsonlHistory {
    path: PathBuf,
    messages: Vec<SourceMessage>,
    index: HashMap<MessageId, usize>,
}

impl JsonlHistory {
    /// Reads and parses the whole export. Malformed lines are logged and skipped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            RelayError::Source(format!("cannot read {}: {}", path.display(), e))
        })?;
        let history = Self::from_lines(path, &raw);
        info!(
            "Loaded {} messages from {}",
            history.messages.len(),
            history.path.display()
        );
        Ok(history)
    }

    pub fn from_lines(path: PathBuf, raw: &str) -> Self {
        let mut messages: Vec<SourceMessage> = Vec::new();
        for (line_num, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SourceMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping line {} of {}: {}", line_num + 1, path.display(), e),
            }
        }
        messages.sort_by_key(|m| (m.date, m.id));

        let index = messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect();

        Self { path, messages, index }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageSource for JsonlHistory {
    fn source_name(&self) -> String {
        format!("JSONL export ({})", self.path.display())
    }

    async fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SourceMessage>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| since.map_or(true, |since| m.date >= since))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageLookup for JsonlHistory {
    async fn lookup(&self, ids: &[MessageId]) -> Result<Vec<SourceMessage>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.index.get(id))
            .map(|&i| self.messages[i].clone())
            .collect())
    }
}
