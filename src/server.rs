use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, CorsConfig};
use crate::maps::{RouteMapper, TrafficMapper};
use crate::slack::{ChatPoster, SlackClient};
use crate::webhook::message_router::MessageRouter;
use crate::webhook::tinnitus::TinnitusRecorder;
use crate::webhook::traffic::TrafficPoster;
use crate::webhook::{self, health};

/// Compose every webhook route. External clients are injected so the router
/// can be built against fakes.
pub fn build_router(
    config: &Config,
    slack: Arc<dyn ChatPoster>,
    mapper: Arc<dyn RouteMapper>,
) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .merge(webhook::route(
            "/api/messagerouter",
            MessageRouter::new(&config.slack.outgoing_webhook, slack),
        ))
        .merge(webhook::route(
            "/api/traffic",
            TrafficPoster::new(config, mapper),
        ))
        .merge(webhook::route(
            "/api/records/tinnitus",
            TinnitusRecorder::new(config),
        ))
        .layer(cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    if cors.allow_all_origins {
        layer = layer.allow_origin(Any);
    } else if !cors.allow_origins_list.is_empty() {
        let origins: Vec<HeaderValue> = cors
            .allow_origins_list
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        layer = layer.allow_origin(AllowOrigin::list(origins));
    }

    layer = if cors.allow_all_methods {
        layer.allow_methods(Any)
    } else {
        layer.allow_methods([Method::GET, Method::POST])
    };

    if cors.allow_all_headers {
        layer = layer.allow_headers(Any);
    }
    layer
}

/// Serve the webhook API until the process is stopped.
pub async fn serve(config: Config, hostname: &str, port: u16) -> Result<()> {
    let slack: Arc<dyn ChatPoster> = Arc::new(SlackClient::new(
        config.slack.api_base.clone(),
        config.slack.bot_user.token.clone(),
    ));
    let mapper: Arc<dyn RouteMapper> = Arc::new(TrafficMapper::new(config.google.clone()));
    let app = build_router(&config, slack, mapper);

    let addr = format!("{hostname}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::maps::tests::FixedMapper;
    use crate::slack::tests::RecordingPoster;

    async fn spawn_with(config: Config, poster: Arc<RecordingPoster>) -> String {
        let app = build_router(&config, poster, Arc::new(FixedMapper::default()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn spawn(poster: Arc<RecordingPoster>) -> String {
        let mut config = sample_config();
        config.records.tinnitus.path = std::env::temp_dir().join("fanghorn-server-test.jsonl");
        spawn_with(config, poster).await
    }

    async fn spawn_cors(cors: CorsConfig) -> String {
        let mut config = sample_config();
        config.cors = cors;
        spawn_with(config, Arc::new(RecordingPoster::default())).await
    }

    fn header(response: &reqwest::Response, name: &str) -> Option<String> {
        response
            .headers()
            .get(name)
            .map(|value| value.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_routes_over_http() {
        let poster = Arc::new(RecordingPoster::default());
        let base = spawn(poster.clone()).await;
        let client = reqwest::Client::new();

        let health: serde_json::Value = client
            .get(format!("{base}/api/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "happy and healthy!");

        let relayed = client
            .post(format!("{base}/api/messagerouter"))
            .form(&[
                ("token", "webhook-secret"),
                ("text", "outage in progress"),
                ("user_name", "alice"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(relayed.status(), reqwest::StatusCode::OK);
        assert_eq!(poster.sent().len(), 1);

        let rejected = client
            .post(format!("{base}/api/traffic"))
            .form(&[("token", "nope"), ("text", "from: home to: work")])
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_allow_all() {
        let base = spawn_cors(CorsConfig {
            allow_all_origins: true,
            allow_all_methods: true,
            allow_all_headers: true,
            ..CorsConfig::default()
        })
        .await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base}/api/health"))
            .header("Origin", "https://anywhere.test")
            .send()
            .await
            .unwrap();
        assert_eq!(
            header(&response, "access-control-allow-origin").as_deref(),
            Some("*")
        );

        let preflight = client
            .request(reqwest::Method::OPTIONS, format!("{base}/api/traffic"))
            .header("Origin", "https://anywhere.test")
            .header("Access-Control-Request-Method", "DELETE")
            .header("Access-Control-Request-Headers", "x-custom")
            .send()
            .await
            .unwrap();
        assert_eq!(
            header(&preflight, "access-control-allow-methods").as_deref(),
            Some("*")
        );
        assert_eq!(
            header(&preflight, "access-control-allow-headers").as_deref(),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_cors_origin_list() {
        let base = spawn_cors(CorsConfig {
            allow_origins_list: vec![
                "https://bot.example.com".to_string(),
                "not\na header".to_string(),
            ],
            ..CorsConfig::default()
        })
        .await;
        let client = reqwest::Client::new();

        let listed = client
            .get(format!("{base}/api/health"))
            .header("Origin", "https://bot.example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(
            header(&listed, "access-control-allow-origin").as_deref(),
            Some("https://bot.example.com")
        );

        let unlisted = client
            .get(format!("{base}/api/health"))
            .header("Origin", "https://evil.test")
            .send()
            .await
            .unwrap();
        assert!(header(&unlisted, "access-control-allow-origin").is_none());

        let preflight = client
            .request(reqwest::Method::OPTIONS, format!("{base}/api/traffic"))
            .header("Origin", "https://bot.example.com")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();
        assert_eq!(
            header(&preflight, "access-control-allow-methods").as_deref(),
            Some("GET,POST")
        );
    }

    #[tokio::test]
    async fn test_cors_disabled_by_default() {
        let base = spawn_cors(CorsConfig::default()).await;
        let response = reqwest::Client::new()
            .get(format!("{base}/api/health"))
            .header("Origin", "https://bot.example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(header(&response, "access-control-allow-origin").is_none());
    }
}
