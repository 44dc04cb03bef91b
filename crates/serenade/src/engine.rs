//! The request pipeline: features, chord, gated emotion, dialogue, sinks.
//!
//! One `Engine` is built at startup and shared behind an `Arc`. Each call
//! runs its stages strictly in order. Feature extraction goes to the
//! blocking pool; everything else is awaited inline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use earshot::key::uses_flats;
use earshot::{
    detect_key, estimate_chord, extract_progression, Analysis, AnalysisError, ChordPrediction,
    ChordChange, Descriptors, FeatureSource, KeyEstimate, SpectralFeatureSource,
};
use parley::{
    ConversationHistory, DialogueError, DialogueGenerator, DialogueRequest, DialogueTurn,
    OllamaDialogue,
};
use serenade_conf::GameConfig;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::emotion::{
    EmotionClassifier, EmotionError, EmotionPrediction, FeatureVector, LinearEmotionModel,
};
use crate::result::GameResult;
use crate::sink::{ArchiveSink, OscSink, ResultSink, SinkError};

const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];
const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "ogg", "webm", "flac"];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("empty input file: {0}")]
    EmptyInput(PathBuf),

    #[error("could not decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: AnalysisError,
    },

    #[error("analysis of {path} failed: {source}")]
    Analysis {
        path: PathBuf,
        source: AnalysisError,
    },

    #[error("emotion model setup failed: {0}")]
    Emotion(#[from] EmotionError),

    #[error("dialogue backend setup failed: {0}")]
    Dialogue(#[from] DialogueError),
}

impl EngineError {
    fn from_analysis(path: &Path, source: AnalysisError) -> Self {
        if source.is_decode() {
            EngineError::Decode {
                path: path.to_path_buf(),
                source,
            }
        } else {
            EngineError::Analysis {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Audio,
    Midi,
}

impl ArtifactKind {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if MIDI_EXTENSIONS.contains(&ext.as_str()) {
            Some(ArtifactKind::Midi)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(ArtifactKind::Audio)
        } else {
            None
        }
    }
}

pub struct Engine {
    confidence_threshold: f64,
    features: Arc<dyn FeatureSource>,
    classifier: Arc<dyn EmotionClassifier>,
    dialogue: Arc<dyn DialogueGenerator>,
    sinks: Vec<Arc<dyn ResultSink>>,
    history: Mutex<ConversationHistory>,
}

impl Engine {
    pub fn new(
        config: &GameConfig,
        features: Arc<dyn FeatureSource>,
        classifier: Arc<dyn EmotionClassifier>,
        dialogue: Arc<dyn DialogueGenerator>,
    ) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            features,
            classifier,
            dialogue,
            sinks: Vec::new(),
            history: Mutex::new(ConversationHistory::new(config.history_limit)),
        }
    }

    /// Sinks receive results in the order they were added.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Production wiring: spectral features, linear emotion model, Ollama,
    /// plus whichever sinks the config enables.
    pub async fn from_config(config: &GameConfig) -> Result<Self, EngineError> {
        let features = Arc::new(SpectralFeatureSource::new(config.sample_rate, config.hop_length));

        let classifier: Arc<dyn EmotionClassifier> = match &config.emotion.model_path {
            Some(path) => {
                info!("loading emotion model from {}", path.display());
                Arc::new(LinearEmotionModel::from_json_file(path, &config.emotion_labels)?)
            }
            None => Arc::new(LinearEmotionModel::builtin(&config.emotion_labels)),
        };

        let mut dialogue = OllamaDialogue::new(
            Some(&config.dialogue.base_url),
            &config.dialogue.model,
            Duration::from_secs(config.dialogue.timeout_secs),
        )?;
        if let Some(prompt) = &config.dialogue.system_prompt {
            dialogue = dialogue.with_system_prompt(prompt.clone());
        }

        let mut engine = Self::new(config, features, classifier, Arc::new(dialogue));

        if config.broadcast.enabled {
            match OscSink::bind(&config.broadcast.target(), &config.broadcast.prefix).await {
                Ok(sink) => engine = engine.with_sink(Arc::new(sink)),
                Err(e) => warn!("broadcast disabled: {}", e),
            }
        }

        if let Some(path) = &config.archive.path {
            info!("archiving results to {}", path.display());
            engine = engine.with_sink(Arc::new(ArchiveSink::new(path)));
        }

        Ok(engine)
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Retained dialogue turns, oldest first.
    pub async fn history(&self) -> Vec<DialogueTurn> {
        self.history.lock().await.snapshot()
    }

    /// Forget all prior turns, starting a new conversation.
    pub async fn reset_history(&self) {
        self.history.lock().await.clear();
        debug!("dialogue history cleared");
    }

    /// Dispatch on file extension. Empty files are rejected up front.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<GameResult, EngineError> {
        let kind = ArtifactKind::from_path(path)
            .ok_or_else(|| EngineError::UnsupportedFormat(path.to_path_buf()))?;

        let metadata = tokio::fs::metadata(path).await.map_err(|e| EngineError::Decode {
            path: path.to_path_buf(),
            source: AnalysisError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        if metadata.len() == 0 {
            return Err(EngineError::EmptyInput(path.to_path_buf()));
        }

        match kind {
            ArtifactKind::Audio => self.process_audio(path).await,
            ArtifactKind::Midi => self.process_midi(path).await,
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_audio(&self, path: &Path) -> Result<GameResult, EngineError> {
        let analysis = self.extract(path, ArtifactKind::Audio).await?;
        let (chord, key, progression) = harmony(&analysis);
        let emotion = self.classify(&analysis.descriptors);

        self.finish(chord, emotion, analysis.descriptors, key, progression)
            .await
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn process_midi(&self, path: &Path) -> Result<GameResult, EngineError> {
        let analysis = self.extract(path, ArtifactKind::Midi).await?;
        let (chord, key, progression) = harmony(&analysis);

        // MIDI carries no spectral descriptors; every classifier input reads 0.0
        let descriptors = Descriptors::zeroed(self.classifier.feature_keys());

        let emotion = if chord.is_some() {
            self.classify(&descriptors)
        } else {
            debug!("no chord in MIDI, skipping emotion");
            None
        };

        self.finish(chord, emotion, descriptors, key, progression)
            .await
    }

    async fn extract(&self, path: &Path, kind: ArtifactKind) -> Result<Analysis, EngineError> {
        let features = Arc::clone(&self.features);
        let owned = path.to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || match kind {
            ArtifactKind::Audio => features.analyze_audio(&owned),
            ArtifactKind::Midi => features.analyze_midi(&owned),
        })
        .await
        .map_err(|e| {
            EngineError::from_analysis(
                path,
                AnalysisError::Analysis(format!("feature task failed: {}", e)),
            )
        })?;

        outcome.map_err(|e| EngineError::from_analysis(path, e))
    }

    /// Predict, then drop anything strictly below the threshold.
    fn classify(&self, descriptors: &Descriptors) -> Option<EmotionPrediction> {
        let features = FeatureVector::from_descriptors(self.classifier.feature_keys(), descriptors);
        let prediction = self.classifier.predict(&features);

        if prediction.confidence < self.confidence_threshold {
            debug!(
                label = %prediction.label,
                confidence = prediction.confidence,
                threshold = self.confidence_threshold,
                "emotion below threshold"
            );
            return None;
        }
        Some(prediction)
    }

    async fn finish(
        &self,
        chord: Option<ChordPrediction>,
        emotion: Option<EmotionPrediction>,
        descriptors: Descriptors,
        key: Option<KeyEstimate>,
        progression: Vec<ChordChange>,
    ) -> Result<GameResult, EngineError> {
        let dialogue = match (&chord, &emotion) {
            (Some(chord), Some(emotion)) => {
                self.converse(&chord.label, &emotion.label, &descriptors).await
            }
            _ => None,
        };

        let result = GameResult {
            chord,
            emotion,
            descriptors,
            dialogue,
            key,
            progression,
        };

        info!(
            chord = result.chord_label().unwrap_or("-"),
            emotion = result.emotion_label().unwrap_or("-"),
            dialogue = result.dialogue.is_some(),
            "result ready"
        );

        self.broadcast(&result).await;
        Ok(result)
    }

    /// One backend call. The history lock is held from snapshot to push so
    /// concurrent requests cannot interleave turns.
    async fn converse(
        &self,
        chord_label: &str,
        emotion_label: &str,
        descriptors: &Descriptors,
    ) -> Option<DialogueTurn> {
        let mut history = self.history.lock().await;
        let prior = history.snapshot();

        let request = DialogueRequest {
            emotion_label,
            chord_label,
            descriptors,
            history: &prior,
        };

        match self.dialogue.generate(request).await {
            Ok(turn) => {
                history.push(turn.clone());
                debug!(retained = history.len(), "history updated");
                Some(turn)
            }
            Err(e) => {
                warn!("dialogue generation failed: {}", e);
                None
            }
        }
    }

    async fn broadcast(&self, result: &GameResult) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(result).await {
                warn!(sink = sink.name(), "sink failed: {}", e);
            }
        }
    }
}

/// Chord, key and progression from whatever chroma the analysis produced.
fn harmony(
    analysis: &Analysis,
) -> (
    Option<ChordPrediction>,
    Option<KeyEstimate>,
    Vec<ChordChange>,
) {
    let Some(chroma) = analysis.chroma.as_ref().filter(|c| !c.is_empty()) else {
        return (None, None, Vec::new());
    };

    let key = detect_key(&chroma.mean_profile());
    let flats = key.as_ref().is_some_and(|k| uses_flats(k.root_pitch_class));

    (
        estimate_chord(chroma, flats),
        key,
        extract_progression(chroma, flats),
    )
}
