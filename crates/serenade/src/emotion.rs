//! Emotion classification from numeric descriptors.

use std::path::{Path, PathBuf};

use earshot::Descriptors;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmotionError {
    #[error("failed to read emotion model {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse emotion model {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid emotion model: {0}")]
    Invalid(String),
}

/// Numeric inputs aligned with a classifier's `feature_keys()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Coerce descriptors onto `keys`. Missing and textual values become 0.0.
    pub fn from_descriptors<K: AsRef<str>>(keys: &[K], descriptors: &Descriptors) -> Self {
        Self(
            keys.iter()
                .map(|k| descriptors.number(k.as_ref()).unwrap_or(0.0))
                .collect(),
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Classifier output: a distribution over the configured labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionPrediction {
    pub label: String,
    pub confidence: f64,
    /// In configured label order
    #[serde(serialize_with = "ordered_map")]
    pub probabilities: Vec<(String, f64)>,
}

impl EmotionPrediction {
    /// Arg-max of `probabilities`; the earliest label wins a tie.
    pub fn from_distribution(probabilities: Vec<(String, f64)>) -> Option<Self> {
        let (label, confidence) = probabilities
            .iter()
            .fold(None::<&(String, f64)>, |best, entry| match best {
                Some(b) if b.1 >= entry.1 => Some(b),
                _ => Some(entry),
            })
            .map(|(l, p)| (l.clone(), *p))?;

        Some(Self {
            label,
            confidence,
            probabilities,
        })
    }

    pub fn probability(&self, label: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }
}

fn ordered_map<S: Serializer>(entries: &[(String, f64)], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (k, v) in entries {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// Maps a fixed-key feature vector to a distribution over labels.
///
/// Implementations must return probabilities over exactly `labels()`, in
/// that order, summing to 1.
pub trait EmotionClassifier: Send + Sync {
    fn feature_keys(&self) -> &[String];

    fn labels(&self) -> &[String];

    fn predict(&self, features: &FeatureVector) -> EmotionPrediction;
}

/// Default features the built-in weights were set against.
pub const DEFAULT_FEATURE_KEYS: [&str; 5] = [
    "tempo",
    "energy",
    "spectral_centroid",
    "zero_crossing_rate",
    "onset_rate",
];

/// (mean, scale) per default feature.
const DEFAULT_STANDARDIZATION: [(f64, f64); 5] = [
    (110.0, 30.0),
    (0.1, 0.08),
    (2000.0, 1000.0),
    (0.08, 0.05),
    (2.0, 1.5),
];

/// Hand-set weights for the default labels, aligned with `DEFAULT_FEATURE_KEYS`.
const DEFAULT_WEIGHTS: [(&str, [f64; 5], f64); 4] = [
    ("joyful", [1.0, 0.6, 0.5, 0.1, 0.4], 0.0),
    ("melancholic", [-1.0, -0.6, -0.5, -0.2, -0.5], 0.0),
    ("tense", [0.4, 0.9, 0.4, 0.6, 0.8], -0.2),
    ("calm", [-0.8, -0.9, -0.3, -0.4, -0.7], 0.0),
];

/// Standardize, weigh, softmax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEmotionModel {
    feature_keys: Vec<String>,
    labels: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// One row per label, one column per feature
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl LinearEmotionModel {
    /// Built-in weights. Labels without built-in weights score zero.
    pub fn builtin(labels: &[String]) -> Self {
        let feature_keys: Vec<String> = DEFAULT_FEATURE_KEYS.iter().map(|s| s.to_string()).collect();
        let (weights, biases) = labels
            .iter()
            .map(|label| {
                DEFAULT_WEIGHTS
                    .iter()
                    .find(|(name, _, _)| name == label)
                    .map(|(_, w, b)| (w.to_vec(), *b))
                    .unwrap_or_else(|| (vec![0.0; feature_keys.len()], 0.0))
            })
            .unzip();

        Self {
            means: DEFAULT_STANDARDIZATION.iter().map(|(m, _)| *m).collect(),
            scales: DEFAULT_STANDARDIZATION.iter().map(|(_, s)| *s).collect(),
            feature_keys,
            labels: labels.to_vec(),
            weights,
            biases,
        }
    }

    /// Load weights from JSON. The file must cover exactly `labels`; rows are
    /// reordered to match.
    pub fn from_json_file(path: &Path, labels: &[String]) -> Result<Self, EmotionError> {
        let text = std::fs::read_to_string(path).map_err(|e| EmotionError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let model: Self = serde_json::from_str(&text).map_err(|e| EmotionError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        model.aligned_to(labels)
    }

    /// Check dimensions and reorder rows into `labels` order.
    pub fn aligned_to(self, labels: &[String]) -> Result<Self, EmotionError> {
        self.validate()?;

        let mut own: Vec<&String> = self.labels.iter().collect();
        let mut wanted: Vec<&String> = labels.iter().collect();
        own.sort();
        wanted.sort();
        if own != wanted {
            return Err(EmotionError::Invalid(format!(
                "model labels {:?} do not match configured labels {:?}",
                self.labels, labels
            )));
        }

        let mut weights = Vec::with_capacity(labels.len());
        let mut biases = Vec::with_capacity(labels.len());
        for label in labels {
            let row = self
                .labels
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| EmotionError::Invalid(format!("missing label {}", label)))?;
            weights.push(self.weights[row].clone());
            biases.push(self.biases[row]);
        }

        Ok(Self {
            labels: labels.to_vec(),
            weights,
            biases,
            ..self
        })
    }

    fn validate(&self) -> Result<(), EmotionError> {
        let n = self.feature_keys.len();
        if n == 0 {
            return Err(EmotionError::Invalid("model declares no features".into()));
        }
        if self.means.len() != n || self.scales.len() != n {
            return Err(EmotionError::Invalid(format!(
                "expected {} means and scales, got {} and {}",
                n,
                self.means.len(),
                self.scales.len()
            )));
        }
        if self.labels.is_empty() {
            return Err(EmotionError::Invalid("model declares no labels".into()));
        }
        if self.weights.len() != self.labels.len() || self.biases.len() != self.labels.len() {
            return Err(EmotionError::Invalid("one weight row and bias per label required".into()));
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != n) {
            return Err(EmotionError::Invalid(format!(
                "weight row has {} entries, expected {}",
                row.len(),
                n
            )));
        }
        let all_values = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.biases)
            .chain(self.weights.iter().flatten());
        for v in all_values {
            if !v.is_finite() {
                return Err(EmotionError::Invalid("model contains non-finite values".into()));
            }
        }
        Ok(())
    }
}

impl EmotionClassifier for LinearEmotionModel {
    fn feature_keys(&self) -> &[String] {
        &self.feature_keys
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, features: &FeatureVector) -> EmotionPrediction {
        let standardized: Vec<f64> = self
            .means
            .iter()
            .zip(&self.scales)
            .enumerate()
            .map(|(i, (mean, scale))| {
                let x = features.values().get(i).copied().unwrap_or(0.0);
                let scale = if scale.abs() < 1e-12 { 1.0 } else { *scale };
                let z = (x - mean) / scale;
                if z.is_finite() {
                    z
                } else {
                    0.0
                }
            })
            .collect();

        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| row.iter().zip(&standardized).map(|(w, z)| w * z).sum::<f64>() + bias)
            .collect();

        let probabilities: Vec<(String, f64)> = self.labels.iter().cloned().zip(softmax(&logits)).collect();

        // labels are non-empty once validated or built from config
        EmotionPrediction::from_distribution(probabilities).unwrap_or_else(|| EmotionPrediction {
            label: String::new(),
            confidence: 0.0,
            probabilities: Vec::new(),
        })
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}
