use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, Utc, Weekday};
use clap::Args;
use tracing::info;

use super::EnvArgs;
use crate::maps::{traffic_message, LocationAliases, RouteMapper, TrafficMapper};
use crate::slack::{ChatPoster, SlackClient};

#[derive(Debug, Args)]
pub struct TrafficArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    #[command(flatten)]
    pub days: DayArgs,

    /// Channel to post message in.
    #[arg(long, default_value = "#general")]
    pub slack_channel: String,

    /// Time in minutes to wait between posts.
    #[arg(short, long, default_value_t = 0.0, value_parser = parse_minutes)]
    pub interval: f64,

    /// Number of posts to make.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub number_of_posts: u32,

    /// Origin address or alias (e.g. "home").
    pub origin: String,

    /// Destination address or alias (e.g. "work").
    pub destination: String,
}

/// Which days of the week the command is allowed to post on.
#[derive(Debug, Clone, Args)]
#[group(multiple = false)]
pub struct DayArgs {
    /// Only run on weekdays.
    #[arg(long)]
    pub weekdays: bool,

    /// Only run on weekends.
    #[arg(long)]
    pub weekends: bool,

    /// Run every day (default).
    #[arg(long)]
    pub all_days: bool,
}

impl DayArgs {
    pub fn includes(&self, day: Weekday) -> bool {
        let weekend = matches!(day, Weekday::Sat | Weekday::Sun);
        if self.weekdays {
            !weekend
        } else if self.weekends {
            weekend
        } else {
            true
        }
    }
}

fn parse_minutes(s: &str) -> Result<f64, String> {
    let minutes: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a number of minutes"))?;
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(format!("interval must be at least 0 (got {s})"));
    }
    Ok(minutes)
}

/// Post traffic maps for ORIGIN and DESTINATION to Slack, `number_of_posts`
/// times with `interval` minutes between posts.
pub async fn run(args: TrafficArgs) -> Result<()> {
    let today = Utc::now().weekday();
    if !args.days.includes(today) {
        println!("Today is not a selected run day. Exiting");
        return Ok(());
    }

    let config = args.env.load_config()?;
    let slack = SlackClient::new(
        config.slack.api_base.clone(),
        config.slack.bot_user.token.clone(),
    );
    let mapper = TrafficMapper::new(config.google.clone());
    let aliases = LocationAliases::new(config.google.location_aliases.clone());

    let plan = PostPlan {
        origin: aliases.resolve(&args.origin),
        destination: aliases.resolve(&args.destination),
        channel: args.slack_channel,
        image_url_format: config.google.static_map.url_format.clone(),
        posts: args.number_of_posts,
        interval: Duration::from_secs_f64(args.interval * 60.0),
    };
    post_traffic(&slack, &mapper, &plan).await
}

pub struct PostPlan {
    pub origin: String,
    pub destination: String,
    pub channel: String,
    pub image_url_format: String,
    pub posts: u32,
    pub interval: Duration,
}

/// Post `plan.posts` maps, sleeping between posts but not after the last.
pub async fn post_traffic(
    slack: &dyn ChatPoster,
    mapper: &dyn RouteMapper,
    plan: &PostPlan,
) -> Result<()> {
    for i in 0..plan.posts {
        let summary = mapper.map_route(&plan.origin, &plan.destination).await?;
        let message = traffic_message(
            &plan.origin,
            &plan.destination,
            &summary,
            &plan.image_url_format,
        );
        slack.post_message(&plan.channel, &message).await?;
        info!("Posted traffic map {}/{}", i + 1, plan.posts);

        if i + 1 < plan.posts {
            tokio::time::sleep(plan.interval).await;
        }
    }
    Ok(())
}
