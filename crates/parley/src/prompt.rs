//! Prompt construction for the dialogue backend.

use crate::types::DialogueTurn;
use crate::DialogueRequest;

/// Persona used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a character in a music game. The player performs \
a short piece and you react to it in one or two vivid sentences, in character, reflecting the \
mood and harmony you are told about. Never mention that you received analysis data.";

/// The user message describing what was just heard.
pub fn describe_state(request: &DialogueRequest<'_>) -> String {
    let mut text = format!(
        "The player just played a {} chord and the music feels {}.",
        request.chord_label, request.emotion_label
    );

    if !request.descriptors.is_empty() {
        text.push_str("\nMusical details:");
        for (key, value) in request.descriptors.iter() {
            text.push_str(&format!("\n- {}: {}", key, value));
        }
    }

    text.push_str("\nRespond with your next line of dialogue.");
    text
}

/// Full message list: system prompt, prior turns oldest first, then the
/// current state as the final user message.
pub fn build_messages(system_prompt: &str, request: &DialogueRequest<'_>) -> Vec<DialogueTurn> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(DialogueTurn::system(system_prompt));
    messages.extend(request.history.iter().cloned());
    messages.push(DialogueTurn::user(describe_state(request)));
    messages
}
