use earshot::{ChordChange, ChordPrediction, Descriptors, KeyEstimate};
use parley::DialogueTurn;
use serde::Serialize;

use crate::emotion::EmotionPrediction;

/// Everything the engine learned from one artifact.
///
/// Built once per request and never mutated; sinks only borrow it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameResult {
    pub chord: Option<ChordPrediction>,
    /// Absent when below the confidence threshold, or skipped for MIDI without a chord
    pub emotion: Option<EmotionPrediction>,
    pub descriptors: Descriptors,
    pub dialogue: Option<DialogueTurn>,
    pub key: Option<KeyEstimate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub progression: Vec<ChordChange>,
}

impl GameResult {
    pub fn chord_label(&self) -> Option<&str> {
        self.chord.as_ref().map(|c| c.label.as_str())
    }

    pub fn emotion_label(&self) -> Option<&str> {
        self.emotion.as_ref().map(|e| e.label.as_str())
    }
}
