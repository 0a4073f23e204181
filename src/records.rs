use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::expand_home;

/// A validated payload stamped with the time it was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Record<T> {
    #[serde(flatten)]
    pub data: T,
    pub recorded_time: DateTime<Utc>,
}

impl<T> Record<T> {
    pub fn now(data: T) -> Self {
        Self {
            data,
            recorded_time: Utc::now(),
        }
    }
}

/// Appends records to a JSON-lines file. Never rewrites or truncates.
///
/// Appends are not synchronized between writers; each record goes out in a
/// single write so small lines do not interleave in practice.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    path: PathBuf,
}

impl RecordWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: expand_home(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open record file: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to record file: {}", self.path.display()))?;
        file.flush().await?;

        debug!("Appended record to {}", self.path.display());
        Ok(())
    }
}
