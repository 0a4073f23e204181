//! Inbound Slack webhooks and slash commands.
//!
//! Every route validates its form parameters first and only then performs a
//! side effect. A route whose token does not match never reaches `dispatch`.

pub mod health;
pub mod message_router;
pub mod tinnitus;
pub mod traffic;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::validation::{FormParams, ValidationErrors};

/// One webhook route: a validation entry point and a side-effect entry point.
#[async_trait]
pub trait Webhook: Send + Sync + 'static {
    type Data: Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn validate(&self, params: &FormParams) -> Result<Self::Data, ValidationErrors>;

    async fn dispatch(&self, data: Self::Data) -> anyhow::Result<Reply>;

    /// Response for a request that failed validation.
    fn reject(&self, _params: &FormParams, errors: ValidationErrors) -> Reply {
        Reply::json(StatusCode::BAD_REQUEST, &errors)
    }
}

/// Status plus optional JSON body.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<serde_json::Value>,
}

impl Reply {
    pub fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    /// A JSON reply. A body that fails to serialize becomes an empty 500.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status,
                body: Some(body),
            },
            Err(e) => {
                error!("Failed to serialize reply body: {}", e);
                Self::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Upstream and I/O failures. Rendered as a 500.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Webhook failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Fields common to every slash command. `text` is parsed per command.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct CommandData<T> {
    pub token: String,
    pub command: String,
    pub text: T,
    pub response_url: reqwest::Url,
}

/// Validate a slash command's fields, parsing `text` with `parse`. Parse
/// failures are reported against the `text` field.
pub fn validate_command<T>(
    params: &FormParams,
    expected_token: &str,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<CommandData<T>, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let token = params.token("token", expected_token, &mut errors);
    let command = params.required("command", &mut errors);
    let response_url = params.url("response_url", &mut errors);
    let text = params
        .required("text", &mut errors)
        .and_then(|text| match parse(&text) {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                errors.add("text", message);
                None
            }
        });

    match (token, command, text, response_url) {
        (Some(token), Some(command), Some(text), Some(response_url)) if errors.is_empty() => {
            Ok(CommandData {
                token,
                command,
                text,
                response_url,
            })
        }
        _ => Err(errors),
    }
}

pub(crate) async fn handle<W: Webhook>(
    State(hook): State<Arc<W>>,
    Form(params): Form<FormParams>,
) -> Result<Reply, AppError> {
    let data = match hook.validate(&params) {
        Ok(data) => data,
        Err(errors) => {
            warn!("Rejected {} request: {}", hook.name(), errors);
            return Ok(hook.reject(&params, errors));
        }
    };
    Ok(hook.dispatch(data).await?)
}

/// Mount `hook` as a POST route at `path`.
pub fn route<W: Webhook>(path: &str, hook: W) -> Router {
    Router::new()
        .route(path, post(handle::<W>))
        .with_state(Arc::new(hook))
}
