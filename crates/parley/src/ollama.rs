//! Ollama `/api/chat` client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::prompt::{build_messages, DEFAULT_SYSTEM_PROMPT};
use crate::types::DialogueTurn;
use crate::{DialogueError, DialogueGenerator, DialogueRequest};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Dialogue generator backed by a local or remote Ollama server.
pub struct OllamaDialogue {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl OllamaDialogue {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, DialogueError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DialogueError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        tracing::info!("dialogue backend: {} at {}", model, base_url);

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DialogueGenerator for OllamaDialogue {
    #[instrument(skip_all, fields(model = %self.model, chord = request.chord_label, emotion = request.emotion_label))]
    async fn generate(&self, request: DialogueRequest<'_>) -> Result<DialogueTurn, DialogueError> {
        let turns = build_messages(&self.system_prompt, &request);
        let body = ChatRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|t| ChatMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        debug!(messages = body.messages.len(), %url, "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DialogueError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialogueError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DialogueError::Malformed(format!("invalid chat response: {}", e)))?;

        let content = parsed
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DialogueError::Malformed("response had no message content".into()))?;

        debug!(chars = content.len(), "dialogue generated");
        Ok(DialogueTurn::assistant(content))
    }
}
