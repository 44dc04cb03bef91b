//! Append-only JSON-lines record of every result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{ResultSink, SinkError};
use crate::result::GameResult;

#[derive(Serialize)]
struct ArchiveRecord<'a> {
    id: Uuid,
    recorded_at: DateTime<Utc>,
    result: &'a GameResult,
}

pub struct ArchiveSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ArchiveSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Archive {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ResultSink for ArchiveSink {
    fn name(&self) -> &str {
        "archive"
    }

    async fn send(&self, result: &GameResult) -> Result<(), SinkError> {
        let record = ArchiveRecord {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            result,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.archive_error(e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.archive_error(e))?;
        file.write_all(&line).await.map_err(|e| self.archive_error(e))?;
        file.flush().await.map_err(|e| self.archive_error(e))?;

        debug!(id = %record.id, path = %self.path.display(), "result archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earshot::Descriptors;
    use parley::DialogueTurn;
    use serde_json::Value;

    #[tokio::test]
    async fn appends_one_line_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/results.jsonl");
        let sink = ArchiveSink::new(&path);

        let mut descriptors = Descriptors::new();
        descriptors.insert("tempo", 120.0);
        let first = GameResult {
            descriptors,
            dialogue: Some(DialogueTurn::assistant("hi")),
            ..Default::default()
        };
        sink.send(&first).await.unwrap();
        sink.send(&GameResult::default()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"]["descriptors"]["tempo"], 120.0);
        assert_eq!(lines[0]["result"]["dialogue"]["content"], "hi");
        assert_eq!(lines[0]["result"]["dialogue"]["role"], "assistant");
        assert!(lines[1]["result"]["chord"].is_null());
        assert_ne!(lines[0]["id"], lines[1]["id"]);
    }

    #[tokio::test]
    async fn unwritable_path_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append
        let sink = ArchiveSink::new(dir.path());
        let err = sink.send(&GameResult::default()).await.unwrap_err();
        assert!(matches!(err, SinkError::Archive { .. }));
    }
}
