//! File-backed logs: the action item log and the send-failure log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::pipeline::types::{ActionItemSink, ActionLogEntry, OutboundEmail};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }
    Ok(())
}

// ── Action log ──────────────────────────────────────────────────────

/// Action items stored as one pretty-printed JSON array.
///
/// Each append rewrites the file through a temp file and rename, so a
/// crash mid-write leaves the previous array intact. An existing file that
/// is unreadable or not an array is replaced with a fresh one.
pub struct JsonActionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries currently on disk. A missing or corrupt file reads as empty.
    pub async fn load(&self) -> Result<Vec<Value>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(parse_entries(&raw, &self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(&self.path)(e)),
        }
    }
}

fn parse_entries(raw: &str, path: &Path) -> Vec<Value> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!(
                path = %path.display(),
                category = "persistence",
                "Action log is not a JSON array, starting a new one"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                category = "persistence",
                error = %e,
                "Action log is corrupt, starting a new one"
            );
            Vec::new()
        }
    }
}

#[async_trait]
impl ActionItemSink for JsonActionLog {
    async fn append(&self, entry: &ActionLogEntry) -> Result<(), StoreError> {
        let value = serde_json::to_value(entry)?;

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.push(value);

        ensure_parent(&self.path).await?;
        let rendered = serde_json::to_string_pretty(&Value::Array(entries))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, rendered)
            .await
            .map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        debug!(
            id = %entry.item.message_id,
            path = %self.path.display(),
            "Action item appended"
        );
        Ok(())
    }
}

// ── Send-failure log ────────────────────────────────────────────────

/// JSON-lines record of replies that could not be delivered.
pub struct SendFailureLog {
    path: PathBuf,
}

impl SendFailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line describing an undeliverable reply.
    pub async fn record(
        &self,
        message_id: &str,
        email: &OutboundEmail,
        attempts: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        let line = serde_json::json!({
            "timestamp": Utc::now(),
            "message_id": message_id,
            "to": email.to,
            "cc": email.cc,
            "subject": email.subject,
            "body": email.body,
            "attempts": attempts,
            "error": error,
        });
        let mut rendered = serde_json::to_string(&line)?;
        rendered.push('\n');

        ensure_parent(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error(&self.path))?;
        file.write_all(rendered.as_bytes())
            .await
            .map_err(io_error(&self.path))?;
        file.flush().await.map_err(io_error(&self.path))?;
        Ok(())
    }
}
