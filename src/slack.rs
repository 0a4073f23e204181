use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

/// A Slack message, used both as a slash-command reply body and as the
/// payload of `chat.postMessage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
}

impl SlackMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
            response_type: None,
        }
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Attachment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

/// Anything that can deliver a message to a chat channel.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    async fn post_message(&self, channel: &str, message: &SlackMessage) -> Result<()>;
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    as_user: bool,
    text: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack Web API client authenticated as the bot user.
pub struct SlackClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl SlackClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ChatPoster for SlackClient {
    async fn post_message(&self, channel: &str, message: &SlackMessage) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base.trim_end_matches('/'));
        let request = PostMessageRequest {
            channel,
            as_user: true,
            text: &message.text,
            attachments: &message.attachments,
        };

        debug!("Posting to Slack: {} ({})", url, channel);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Slack")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack API error ({}): {}", status, error_body);
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .context("Failed to parse Slack response")?;
        if !body.ok {
            anyhow::bail!(
                "Slack rejected chat.postMessage: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        info!("Posted message to {}", channel);
        Ok(())
    }
}
