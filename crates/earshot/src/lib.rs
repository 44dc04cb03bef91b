//! Listening side of Serenade: turns an audio or MIDI file into chroma,
//! chords, key and named descriptors.

pub mod chord_templates;
pub mod chords;
pub mod decode;
pub mod key;
pub mod midi;
pub mod spectral;
pub mod types;

pub use chord_templates::match_chroma;
pub use chords::{estimate_chord, extract_progression};
pub use key::detect_key;
pub use types::{
    Analysis, ChordChange, ChordPrediction, ChordQuality, Chromagram, DescriptorValue,
    Descriptors, KeyEstimate, KeyMode,
};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Numeric descriptors produced for audio, in emission order.
pub const NUMERIC_DESCRIPTORS: [&str; 6] = [
    "duration",
    "tempo",
    "energy",
    "spectral_centroid",
    "zero_crossing_rate",
    "onset_rate",
];

/// Textual descriptors produced for audio when a key is found.
pub const TEXT_DESCRIPTORS: [&str; 2] = ["key", "scale"];

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("MIDI parse failed: {0}")]
    Midi(String),

    #[error("analysis failed: {0}")]
    Analysis(String),
}

impl AnalysisError {
    /// The artifact could not be read or decoded, as opposed to a failure
    /// while analyzing decoded content.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            AnalysisError::Io { .. } | AnalysisError::Decode(_) | AnalysisError::Midi(_)
        )
    }
}

/// Produces chroma and descriptors for one artifact.
///
/// Implementations are synchronous and CPU-bound; async callers should
/// run them on a blocking thread.
pub trait FeatureSource: Send + Sync {
    fn analyze_audio(&self, path: &Path) -> Result<Analysis, AnalysisError>;

    /// MIDI yields chroma only; descriptors are left empty.
    fn analyze_midi(&self, path: &Path) -> Result<Analysis, AnalysisError>;
}

/// STFT-based feature extraction for audio, note-based chroma for MIDI.
#[derive(Debug, Clone)]
pub struct SpectralFeatureSource {
    sample_rate: u32,
    hop_length: usize,
    fft_size: usize,
}

impl SpectralFeatureSource {
    pub const DEFAULT_FFT_SIZE: usize = 2048;

    pub fn new(sample_rate: u32, hop_length: usize) -> Self {
        Self {
            sample_rate,
            hop_length: hop_length.max(1),
            fft_size: Self::DEFAULT_FFT_SIZE,
        }
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size.max(2);
        self
    }

    /// Chroma and descriptors for mono samples already at `self.sample_rate`.
    pub fn analyze_samples(&self, samples: &[f32]) -> Result<Analysis, AnalysisError> {
        if samples.is_empty() {
            return Err(AnalysisError::Analysis("no audio samples".into()));
        }

        let spectrogram = spectral::stft(samples, self.fft_size, self.hop_length)?;
        let chroma = Chromagram::new(
            spectral::chroma_frames(&spectrogram, self.sample_rate, self.fft_size),
            self.hop_length as f64 / self.sample_rate as f64,
        );

        let frame_rate = self.sample_rate as f64 / self.hop_length as f64;
        let duration = samples.len() as f64 / self.sample_rate as f64;
        let envelope = spectral::onset_envelope(&spectrogram);
        let onsets = spectral::count_onsets(&envelope);

        let values = [
            duration,
            spectral::estimate_tempo(&envelope, frame_rate),
            spectral::mean(&spectral::rms_energy(samples, self.fft_size.min(samples.len()), self.hop_length)),
            spectral::mean(&spectral::spectral_centroid(&spectrogram, self.sample_rate, self.fft_size)),
            spectral::mean(&spectral::zero_crossing_rate(samples, self.fft_size.min(samples.len()), self.hop_length)),
            if duration > 0.0 { onsets as f64 / duration } else { 0.0 },
        ];

        let mut descriptors: Descriptors = NUMERIC_DESCRIPTORS.iter().copied().zip(values).collect();

        if let Some(key) = detect_key(&chroma.mean_profile()) {
            let [key_name, scale_name] = TEXT_DESCRIPTORS;
            descriptors.insert(key_name, key.root.as_str());
            descriptors.insert(scale_name, key.mode.to_string());
        }

        debug!(frames = chroma.len(), onsets, "spectral analysis complete");

        Ok(Analysis {
            chroma: Some(chroma),
            descriptors,
        })
    }
}

impl Default for SpectralFeatureSource {
    fn default() -> Self {
        Self::new(22050, 512)
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, AnalysisError> {
    std::fs::read(path).map_err(|e| AnalysisError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

impl FeatureSource for SpectralFeatureSource {
    #[instrument(skip(self), fields(sample_rate = self.sample_rate, hop = self.hop_length))]
    fn analyze_audio(&self, path: &Path) -> Result<Analysis, AnalysisError> {
        let bytes = read_artifact(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        let audio = decode::decode_audio(&bytes, extension)?;

        debug!(
            source_rate = audio.sample_rate,
            channels = audio.channels,
            seconds = audio.duration_seconds(),
            "decoded audio"
        );

        let mono = decode::resample(&audio.to_mono(), audio.sample_rate, self.sample_rate)?;
        self.analyze_samples(&mono)
    }

    #[instrument(skip(self))]
    fn analyze_midi(&self, path: &Path) -> Result<Analysis, AnalysisError> {
        let bytes = read_artifact(path)?;
        let smf = midly::Smf::parse(&bytes).map_err(|e| AnalysisError::Midi(e.to_string()))?;
        let (notes, timing) = midi::extract_notes(&smf);

        debug!(notes = notes.len(), ppq = timing.ppq, "extracted MIDI notes");

        Ok(Analysis {
            chroma: midi::notes_to_chroma(&notes, &timing)?,
            descriptors: Descriptors::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn chord_samples(freqs: &[f32], seconds: f32, sample_rate: u32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * 0.2
            })
            .collect()
    }

    #[test]
    fn empty_samples_rejected() {
        let err = SpectralFeatureSource::default().analyze_samples(&[]).unwrap_err();
        assert!(matches!(err, AnalysisError::Analysis(_)));
        assert!(!err.is_decode());
    }

    #[test]
    fn descriptors_have_fixed_keys() {
        let samples = chord_samples(&[261.63, 329.63, 392.0], 1.0, 22050);
        let analysis = SpectralFeatureSource::default().analyze_samples(&samples).unwrap();

        let keys: Vec<_> = analysis.descriptors.keys().collect();
        assert_eq!(&keys[..6], &NUMERIC_DESCRIPTORS[..]);
        assert_eq!(&keys[6..], &TEXT_DESCRIPTORS[..]);
        assert!(analysis.descriptors.get("scale").and_then(|v| v.as_text()).is_some());
        assert!((analysis.descriptors.number("duration").unwrap() - 1.0).abs() < 1e-3);
        assert!(analysis.descriptors.number("energy").unwrap() > 0.0);
    }

    #[test]
    fn c_major_chord_recognized_from_audio() {
        let samples = chord_samples(&[261.63, 329.63, 392.0], 1.0, 22050);
        let analysis = SpectralFeatureSource::default().analyze_samples(&samples).unwrap();
        let chroma = analysis.chroma.unwrap();

        let chord = estimate_chord(&chroma, false).unwrap();
        assert_eq!(chord.label, "C");
    }

    #[test]
    fn missing_file_is_decode_side() {
        let err = SpectralFeatureSource::default()
            .analyze_audio(Path::new("/nonexistent/clip.wav"))
            .unwrap_err();
        assert!(err.is_decode());
    }
}
