use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config::default_config_dir;

// Bundled at compile time so the binary can bootstrap a config directory.
const TEMPLATES: [(&str, &str); 4] = [
    ("default.yaml", include_str!("../../config_files/default.yaml")),
    ("local.yaml", include_str!("../../config_files/local.yaml")),
    ("prod.yaml", include_str!("../../config_files/prod.yaml")),
    ("secret.yaml", include_str!("../../config_files/secret.yaml")),
];

#[derive(Debug, Args)]
pub struct CreateConfigsArgs {
    /// Explicit configuration directory to use.
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Overwrite files that already exist.
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: CreateConfigsArgs) -> Result<()> {
    let dir = args.config_dir.unwrap_or_else(default_config_dir);
    let written = write_templates(&dir, args.force)?;

    for path in &written {
        println!("wrote {}", path.display());
    }
    if written.len() < TEMPLATES.len() {
        println!("kept existing files (use --force to overwrite)");
    }
    println!("Edit {} before starting the bot.", dir.join("secret.yaml").display());
    Ok(())
}

/// Copy the template files into `dir`, returning the paths written.
pub fn write_templates(dir: &Path, force: bool) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

    let mut written = Vec::new();
    for (name, content) in TEMPLATES {
        let path = dir.join(name);
        if path.exists() && !force {
            info!("Keeping existing {}", path.display());
            continue;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Could not write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
