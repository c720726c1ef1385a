use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::SendParams;
use crate::utils::format::timestamp;

/// Append-only file of failed pushes, one line per failure.
///
/// Writes never fail the caller; problems with the file are reported through
/// `tracing` instead.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Separates runs of the process in the file.
    pub async fn mark_startup(&self) {
        let entry = format!(
            "\n========================================\n本次启动时间: {}\n========================================\n",
            timestamp()
        );
        self.append(&entry).await;
    }

    /// Records one failed request.
    pub async fn record(
        &self,
        route: &str,
        platform: &str,
        detail: &str,
        params: Option<&SendParams>,
    ) {
        let entry = format_entry(&timestamp(), route, platform, detail, params);
        self.append(&entry).await;
    }

    async fn append(&self, entry: &str) {
        let _guard = self.write_lock.lock().await;
        if let Err(err) = self.try_append(entry).await {
            tracing::warn!("failed to write error log {}: {}", self.path.display(), err);
        }
    }

    async fn try_append(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

fn format_entry(
    ts: &str,
    route: &str,
    platform: &str,
    detail: &str,
    params: Option<&SendParams>,
) -> String {
    let params = params.map(SendParams::describe).unwrap_or_default();
    format!(
        "[{}] {} - {}返回响应: {} | 请求参数:{}\n",
        ts, route, platform, detail, params
    )
}
