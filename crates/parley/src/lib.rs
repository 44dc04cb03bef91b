//! Conversational side of Serenade: bounded turn history, prompt
//! construction, and the text-generation backend.

pub mod history;
pub mod ollama;
pub mod prompt;
pub mod types;

pub use history::ConversationHistory;
pub use ollama::OllamaDialogue;
pub use types::{DialogueTurn, Role};

use async_trait::async_trait;
use earshot::Descriptors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogueError {
    /// Transport failure: refused connection, timeout, DNS.
    #[error("dialogue backend unavailable: {0}")]
    Unavailable(String),

    #[error("dialogue backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body was not the expected shape, or held no usable text.
    #[error("malformed dialogue response: {0}")]
    Malformed(String),
}

/// Everything the generator sees for one turn.
#[derive(Debug, Clone, Copy)]
pub struct DialogueRequest<'a> {
    pub emotion_label: &'a str,
    pub chord_label: &'a str,
    pub descriptors: &'a Descriptors,
    /// Prior turns, oldest first
    pub history: &'a [DialogueTurn],
}

/// Produces one new assistant turn for the current musical state.
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    async fn generate(&self, request: DialogueRequest<'_>) -> Result<DialogueTurn, DialogueError>;
}
