use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::EnvArgs;
use crate::slack::{Attachment, ChatPoster, SlackClient, SlackMessage};

#[derive(Debug, Args)]
pub struct PingSiteArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Channel to post message in.
    #[arg(long, default_value = "#general")]
    pub slack_channel: String,

    /// Time in minutes to ping site for.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=60))]
    pub duration: u64,

    /// Time in seconds between pings.
    #[arg(short, long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub sleep_time: u64,

    /// URL to ping.
    pub url: String,
}

/// Ping URL for the given duration and alert the channel on bad responses.
pub async fn run(args: PingSiteArgs) -> Result<()> {
    let config = args.env.load_config()?;
    let slack = SlackClient::new(
        config.slack.api_base.clone(),
        config.slack.bot_user.token.clone(),
    );
    let client = reqwest::Client::new();

    let deadline = Instant::now() + Duration::from_secs(args.duration * 60);
    let pause = Duration::from_secs(args.sleep_time);
    while Instant::now() < deadline {
        check_site(&client, &slack, &args.url, &args.slack_channel).await?;
        tokio::time::sleep(pause).await;
    }
    Ok(())
}

/// One ping. Posts an alert and returns `false` when the site is unhealthy.
pub async fn check_site(
    client: &reqwest::Client,
    slack: &dyn ChatPoster,
    url: &str,
    channel: &str,
) -> Result<bool> {
    let detail = match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            if !(status.is_client_error() || status.is_server_error()) {
                debug!("{} answered {}", url, status);
                return Ok(true);
            }
            format!("Status Code: {}", status.as_u16())
        }
        Err(e) => format!("Request failed: {}", e),
    };

    warn!("{} is unhealthy: {}", url, detail);
    slack.post_message(channel, &outage_message(url, detail)).await?;
    Ok(false)
}

fn outage_message(url: &str, detail: String) -> SlackMessage {
    SlackMessage::new(format!("<!channel> {} is returning a bad response.", url)).attachment(
        Attachment {
            color: Some("danger".to_string()),
            ..Attachment::text(detail)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::tests::RecordingPoster;
    use axum::{http::StatusCode, routing::get, Router};
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: PingSiteArgs,
    }

    async fn spawn_site() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_cli_defaults_and_ranges() {
        let cli = TestCli::parse_from(["test", "https://example.com"]);
        assert_eq!(cli.args.duration, 1);
        assert_eq!(cli.args.sleep_time, 15);
        assert_eq!(cli.args.slack_channel, "#general");

        assert!(TestCli::try_parse_from(["test", "-d", "61", "https://example.com"]).is_err());
        assert!(TestCli::try_parse_from(["test", "-s", "0", "https://example.com"]).is_err());
    }

    #[tokio::test]
    async fn test_healthy_site_posts_nothing() {
        let base = spawn_site().await;
        let slack = RecordingPoster::default();
        let client = reqwest::Client::new();

        let healthy = check_site(&client, &slack, &format!("{base}/ok"), "#ops")
            .await
            .unwrap();
        assert!(healthy);
        assert!(slack.sent().is_empty());
    }

    #[tokio::test]
    async fn test_bad_status_alerts_channel() {
        let base = spawn_site().await;
        let slack = RecordingPoster::default();
        let client = reqwest::Client::new();
        let url = format!("{base}/down");

        let healthy = check_site(&client, &slack, &url, "#ops").await.unwrap();
        assert!(!healthy);

        let sent = slack.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "#ops");
        assert_eq!(
            sent[0].1.text,
            format!("<!channel> {} is returning a bad response.", url)
        );
        assert_eq!(
            sent[0].1.attachments[0].text.as_deref(),
            Some("Status Code: 503")
        );
        assert_eq!(sent[0].1.attachments[0].color.as_deref(), Some("danger"));
    }

    #[tokio::test]
    async fn test_unreachable_site_alerts_channel() {
        let slack = RecordingPoster::default();
        let client = reqwest::Client::new();

        let healthy = check_site(&client, &slack, "http://127.0.0.1:1/", "#ops")
            .await
            .unwrap();
        assert!(!healthy);
        let sent = slack.sent();
        assert!(sent[0].1.attachments[0]
            .text
            .as_deref()
            .unwrap()
            .starts_with("Request failed"));
    }
}
