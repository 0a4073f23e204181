use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::info;

use super::{validate_command, CommandData, Reply, Webhook};
use crate::config::Config;
use crate::records::{Record, RecordWriter};
use crate::slack::{Attachment, ResponseType, SlackMessage};
use crate::validation::{parse_tinnitus, FormParams, TinnitusReading, ValidationErrors};

/// `/tinnitus L1120`: appends a reading to the tinnitus log.
pub struct TinnitusRecorder {
    token: String,
    writer: RecordWriter,
}

impl TinnitusRecorder {
    pub fn new(config: &Config) -> Self {
        Self {
            token: config.slack.tinnitus_command.token.clone(),
            writer: RecordWriter::new(&config.records.tinnitus.path),
        }
    }
}

#[async_trait]
impl Webhook for TinnitusRecorder {
    type Data = CommandData<TinnitusReading>;

    fn name(&self) -> &'static str {
        "tinnitus"
    }

    fn validate(&self, params: &FormParams) -> Result<Self::Data, ValidationErrors> {
        validate_command(params, &self.token, parse_tinnitus)
    }

    async fn dispatch(&self, data: Self::Data) -> anyhow::Result<Reply> {
        let reading = data.text;
        self.writer.append(&Record::now(reading)).await?;
        info!(
            "Recorded tinnitus reading to {}",
            self.writer.path().display()
        );

        let message = SlackMessage::new(format!(
            "record successfully written\near: {}\naudibility: {}\ndecibels: {}",
            reading.ear, reading.audibility, reading.decibels
        ))
        .response_type(ResponseType::Ephemeral);
        Ok(Reply::json(StatusCode::OK, &message))
    }

    fn reject(&self, params: &FormParams, errors: ValidationErrors) -> Reply {
        let details = serde_json::to_string(&errors).unwrap_or_default();
        let message = SlackMessage::new(format!(
            "invalid command format: {}",
            params.get("text").unwrap_or_default()
        ))
        .attachment(Attachment::text(details))
        .response_type(ResponseType::Ephemeral);
        Reply::json(StatusCode::BAD_REQUEST, &message)
    }
}
