use crate::traits::EventStream;
use crate::types::{Result, SourceEvent};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// Live events as JSON lines, e.g. `{"event":"deleted","ids":[42]}`, read in arrival order.
pub struct JsonlEventStream<R> {
    lines: Lines<R>,
    line_num: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonlEventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
        }
    }
}

impl JsonlEventStream<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl JsonlEventStream<BufReader<tokio::fs::File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventStream for JsonlEventStream<R> {
    async fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_num += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SourceEvent>(line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("Skipping malformed event on line {}: {}", self.line_num, e),
            }
        }
        Ok(None)
    }
}
