pub mod create_configs;
pub mod ping_site;
pub mod traffic;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{default_config_dir, Config, Environment};

/// Environment selection shared by every command that loads configuration.
#[derive(Debug, Clone, Args)]
pub struct EnvArgs {
    /// Run with dev configs (default).
    #[arg(long, conflicts_with = "prod")]
    pub local: bool,

    /// Run with prod configs.
    #[arg(long)]
    pub prod: bool,

    /// Explicit configuration directory to use.
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl EnvArgs {
    pub fn environment(&self) -> Environment {
        if self.prod {
            Environment::Prod
        } else {
            Environment::Local
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(default_config_dir)
    }

    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(self.environment(), &self.config_dir())?)
    }
}
