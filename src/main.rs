mod commands;
mod config;
mod maps;
mod records;
mod server;
mod slack;
mod validation;
mod webhook;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::create_configs::CreateConfigsArgs;
use crate::commands::ping_site::PingSiteArgs;
use crate::commands::traffic::TrafficArgs;
use crate::commands::EnvArgs;

#[derive(Parser)]
#[command(name = "fanghorn")]
#[command(about = "Slack bot for personal use")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server.
    #[command(alias = "dev-server")]
    Serve(ServeArgs),
    /// Copy the template config files into a usable location.
    CreateConfigs(CreateConfigsArgs),
    /// Post traffic maps for the provided ORIGIN and DESTINATION to Slack.
    ///
    /// Aliases from the configuration may be used for ORIGIN or DESTINATION
    /// (e.g. "work" or "home"), or full addresses.
    Traffic(TrafficArgs),
    /// Ping a URL for a while and alert Slack when it responds badly.
    PingSite(PingSiteArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    env: EnvArgs,

    /// Host for the server.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    hostname: String,

    /// Port for the server.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fanghorn=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.env.load_config().with_context(|| {
                format!(
                    "Failed to load {} configuration from {}",
                    args.env.environment(),
                    args.env.config_dir().display()
                )
            })?;
            info!("Server is starting...");
            server::serve(config, &args.hostname, args.port).await?;
        }
        Commands::CreateConfigs(args) => commands::create_configs::run(args)?,
        Commands::Traffic(args) => commands::traffic::run(args).await?,
        Commands::PingSite(args) => commands::ping_site::run(args).await?,
    }

    Ok(())
}
