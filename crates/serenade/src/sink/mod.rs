//! Downstream consumers of finished results.
//!
//! Sinks are best-effort. The engine calls each one in registration order
//! and logs failures; a failing sink never changes the result or stops the
//! sinks after it.

pub mod archive;
pub mod osc;

pub use archive::ArchiveSink;
pub use osc::OscSink;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::result::GameResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to resolve broadcast target {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("archive write to {path} failed: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, result: &GameResult) -> Result<(), SinkError>;
}
