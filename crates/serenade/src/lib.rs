//! Serenade turns a short performance into a game reaction: the chord that
//! was played, how it feels, and a line of dialogue from an in-game
//! character. Results can be broadcast to a real-time engine over OSC and
//! archived as JSON lines.

pub mod emotion;
pub mod engine;
pub mod result;
pub mod sink;
pub mod telemetry;

pub use emotion::{EmotionClassifier, EmotionPrediction, FeatureVector, LinearEmotionModel};
pub use engine::{Engine, EngineError};
pub use result::GameResult;
pub use sink::{ArchiveSink, OscSink, ResultSink, SinkError};
