//! # Webhook API Client
//!
//! This module provides a client for sending messages to a chat through the
//! webhook URL received with each callback. It handles text, markdown and file
//! messages, plus the media upload files need first.

use super::outgoing_schemas::OutgoingMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const SEND_PATH: &str = "webhook/send";
const UPLOAD_PATH: &str = "webhook/upload_media";

/// Result envelope returned by every webhook endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookResponse {
    /// `0` on success
    #[serde(default)]
    pub errcode: i32,
    #[serde(default)]
    pub errmsg: String,
}

impl WebhookResponse {
    fn check(self) -> Result<Self> {
        if self.errcode != 0 {
            anyhow::bail!("webhook returned errcode {}: {}", self.errcode, self.errmsg);
        }
        Ok(self)
    }
}

/// Response from the media upload endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub response: WebhookResponse,
    #[serde(rename = "type", default)]
    pub media_type: String,
    /// Media id to reference in a file message, valid for three days
    #[serde(default)]
    pub media_id: String,
    #[serde(default)]
    pub created_at: String,
}

/// Delivers outgoing messages to a webhook URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, webhook_url: &str, message: &OutgoingMessage) -> Result<WebhookResponse>;
}

/// Webhook client backed by a shared HTTP connection pool
#[derive(Debug, Clone, Default)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already configured HTTP client (proxy, timeouts)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Sends a text message to the chat of `webhook_url`
    pub async fn send_text(&self, webhook_url: &str, content: &str) -> Result<WebhookResponse> {
        self.send(webhook_url, &OutgoingMessage::text(content)).await
    }

    /// Sends a markdown message to the chat of `webhook_url`
    pub async fn send_markdown(&self, webhook_url: &str, content: &str) -> Result<WebhookResponse> {
        self.send(webhook_url, &OutgoingMessage::markdown(content))
            .await
    }

    /// Uploads file bytes and returns the media id to reference in a file message
    ///
    /// # Arguments
    /// * `webhook_url` - Send URL of the chat, the upload URL is derived from it
    /// * `filename` - Name shown in the chat
    /// * `data` - File content
    pub async fn upload(&self, webhook_url: &str, filename: &str, data: Vec<u8>) -> Result<UploadResponse> {
        let upload_url = upload_url(webhook_url);
        let length = data.len();

        let file_part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("media", file_part);

        let response = self
            .client
            .post(&upload_url)
            .query(&[("type", "file")])
            .multipart(form)
            .send()
            .await
            .context("failed to upload media to webhook")?;

        check_status(&response)?;
        let upload: UploadResponse = response
            .json()
            .await
            .context("failed to parse webhook upload response")?;
        upload.response.clone().check()?;

        debug!(filename, length, media_id = %upload.media_id, "media uploaded");
        Ok(upload)
    }

    /// Uploads `data` and sends it as a file message
    pub async fn send_file_content(
        &self,
        webhook_url: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<WebhookResponse> {
        let upload = self.upload(webhook_url, filename, data).await?;
        self.send(webhook_url, &OutgoingMessage::file(upload.media_id))
            .await
    }
}

#[async_trait]
impl OutboundSender for WebhookClient {
    async fn send(&self, webhook_url: &str, message: &OutgoingMessage) -> Result<WebhookResponse> {
        let response = self
            .client
            .post(webhook_url)
            .json(message)
            .send()
            .await
            .context("failed to send request to webhook")?;

        check_status(&response)?;
        let webhook_response: WebhookResponse = response
            .json()
            .await
            .context("failed to parse webhook response")?;

        debug!(msgtype = message.msg_type(), errcode = webhook_response.errcode, "message sent");
        webhook_response.check()
    }
}

/// Rejects non-2xx statuses and the `Error-Code` header some gateways set instead of a body
fn check_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("webhook returned error status {status}");
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let code = header("Error-Code");
    if !code.is_empty() && code != "0" {
        anyhow::bail!("Error-Code: {code}, Error-Msg: {}", header("Error-Msg"));
    }

    Ok(())
}

/// Upload endpoint of the chat `webhook_url` sends to
pub fn upload_url(webhook_url: &str) -> String {
    webhook_url.replace(SEND_PATH, UPLOAD_PATH)
}
