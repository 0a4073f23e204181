use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::{debug, info};

use super::{Reply, Webhook};
use crate::config::{MatcherConfig, OutgoingWebhookConfig};
use crate::slack::{Attachment, ChatPoster, SlackMessage};
use crate::validation::{FormParams, ValidationErrors};

const RELAY_TEXT: &str = "This looks interesting...";

/// Payload of a Slack outgoing webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct WebhookData {
    pub token: String,
    pub text: String,
    pub user_name: String,
}

/// Relays a user's message when it contains any of the configured phrases.
#[derive(Debug, Clone)]
pub struct Matcher {
    text_contains: Vec<String>,
    output_channel: String,
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        self.text_contains.iter().any(|needle| text.contains(needle.as_str()))
    }

    pub fn channel(&self) -> &str {
        &self.output_channel
    }
}

impl From<&MatcherConfig> for Matcher {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            text_contains: config.text_contains.clone(),
            output_channel: config.output_channel.clone(),
        }
    }
}

pub struct MessageRouter {
    token: String,
    matchers: HashMap<String, Matcher>,
    slack: Arc<dyn ChatPoster>,
}

impl MessageRouter {
    pub fn new(config: &OutgoingWebhookConfig, slack: Arc<dyn ChatPoster>) -> Self {
        let matchers = config
            .matchers
            .iter()
            .map(|(user_name, matcher)| (user_name.clone(), Matcher::from(matcher)))
            .collect();
        Self {
            token: config.token.clone(),
            matchers,
            slack,
        }
    }
}

#[async_trait]
impl Webhook for MessageRouter {
    type Data = WebhookData;

    fn name(&self) -> &'static str {
        "message router"
    }

    fn validate(&self, params: &FormParams) -> Result<WebhookData, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let token = params.token("token", &self.token, &mut errors);
        let text = params.required("text", &mut errors);
        let user_name = params
            .required("user_name", &mut errors)
            .filter(|name| {
                let known = self.matchers.contains_key(name);
                if !known {
                    errors.add("user_name", "invalid user name");
                }
                known
            });

        match (token, text, user_name) {
            (Some(token), Some(text), Some(user_name)) if errors.is_empty() => Ok(WebhookData {
                token,
                text,
                user_name,
            }),
            _ => Err(errors),
        }
    }

    async fn dispatch(&self, data: WebhookData) -> anyhow::Result<Reply> {
        let Some(matcher) = self.matchers.get(&data.user_name) else {
            return Ok(Reply::empty(StatusCode::OK));
        };

        if matcher.matches(&data.text) {
            info!("Relaying message from {} to {}", data.user_name, matcher.channel());
            let message = SlackMessage::new(RELAY_TEXT).attachment(Attachment::text(data.text));
            self.slack.post_message(matcher.channel(), &message).await?;
        } else {
            debug!("No match for message from {}", data.user_name);
        }

        Ok(Reply::empty(StatusCode::OK))
    }
}
