use crate::config::PublisherConfig;
use crate::types::{MessageId, PublishPayload, Publisher, RelayError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Publishes payloads to the news API over HTTP. No retries: a failed call is reported and dropped.
pub struct HttpPublisher {
    client: Client,
    create_url: Url,
    delete_url: Option<Url>,
    origin: Option<String>,
}

impl HttpPublisher {
    pub fn new(config: &PublisherConfig) -> Result<Self> {
        let create_url = config
            .create_url
            .as_deref()
            .ok_or_else(|| RelayError::Config("publisher.create_url is not set".to_string()))?;
        let create_url = Url::parse(create_url)?;
        let delete_url = config.delete_url.as_deref().map(Url::parse).transpose()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            create_url,
            delete_url,
            origin: config.origin.clone(),
        })
    }

    fn with_origin(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.origin {
            Some(origin) => request.header("Origin", origin),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RelayError::Publish {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_payload(&self, payload: &PublishPayload) -> Result<()> {
        debug!("Sending {:?} to {}", payload, self.create_url);
        let request = self.client.post(self.create_url.clone()).json(payload);
        let response = self.with_origin(request).send().await?;
        Self::check(response).await
    }

    async fn send_delete(&self, message_id: MessageId) -> Result<()> {
        let Some(delete_url) = &self.delete_url else {
            info!("No delete URL configured, not propagating deletion of {}", message_id);
            return Ok(());
        };
        let request = self.client.post(delete_url.clone()).json(&json!({ "id": message_id }));
        let response = self.with_origin(request).send().await?;
        Self::check(response).await
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, payload: &PublishPayload) -> anyhow::Result<()> {
        self.send_payload(payload).await?;
        info!("Message {} successfully sent to API", payload.group_id);
        Ok(())
    }

    async fn delete(&self, message_id: MessageId) -> anyhow::Result<()> {
        Ok(self.send_delete(message_id).await?)
    }
}

/// Logs what would have been sent. Used with `--dry`.
pub struct DryRunPublisher;

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, payload: &PublishPayload) -> anyhow::Result<()> {
        info!(
            "Dry run: would publish {} ({} media, text: {:?})",
            payload.group_id,
            payload.media.len(),
            payload.text
        );
        Ok(())
    }

    async fn delete(&self, message_id: MessageId) -> anyhow::Result<()> {
        info!("Dry run: would delete {}", message_id);
        Ok(())
    }
}
