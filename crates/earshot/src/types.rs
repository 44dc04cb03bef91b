use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Frame-wise 12-bin pitch-class energy, C=0 through B=11.
#[derive(Debug, Clone, PartialEq)]
pub struct Chromagram {
    frames: Vec<[f64; 12]>,
    /// Seconds covered by one frame
    frame_seconds: f64,
}

impl Chromagram {
    pub fn new(frames: Vec<[f64; 12]>, frame_seconds: f64) -> Self {
        Self {
            frames,
            frame_seconds,
        }
    }

    pub fn frames(&self) -> &[[f64; 12]] {
        &self.frames
    }

    pub fn frame_seconds(&self) -> f64 {
        self.frame_seconds
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Mean energy per pitch class across all frames.
    pub fn mean_profile(&self) -> [f64; 12] {
        summed_profile(&self.frames)
    }
}

/// Average a run of chroma frames into one profile.
pub(crate) fn summed_profile(frames: &[[f64; 12]]) -> [f64; 12] {
    let mut profile = [0.0; 12];
    if frames.is_empty() {
        return profile;
    }
    for frame in frames {
        for (acc, v) in profile.iter_mut().zip(frame) {
            *acc += v;
        }
    }
    let n = frames.len() as f64;
    for v in &mut profile {
        *v /= n;
    }
    profile
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

/// Estimated tonal center of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// Root note name: "C", "Db", "F#", etc.
    pub root: String,
    /// Pitch class 0–11 (C=0, C#=1, ...)
    pub root_pitch_class: u8,
    pub mode: KeyMode,
    /// Pearson correlation with best-matching key profile
    pub confidence: f64,
}

impl KeyEstimate {
    /// "A minor", "Eb major"
    pub fn label(&self) -> String {
        format!("{} {}", self.root, self.mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended4,
    Suspended2,
    Dominant7,
    Major7,
    Minor7,
    Diminished7,
    HalfDiminished7,
    Power,
}

impl ChordQuality {
    /// Suffix for chord symbol display
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Suspended4 => "sus4",
            ChordQuality::Suspended2 => "sus2",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Diminished7 => "dim7",
            ChordQuality::HalfDiminished7 => "m7b5",
            ChordQuality::Power => "5",
        }
    }
}

/// Best-matching chord for a whole recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordPrediction {
    /// Full chord symbol: "Cmaj7", "Dm", "G7"
    pub label: String,
    pub root_pitch_class: u8,
    pub quality: ChordQuality,
    /// Cosine similarity between the chroma profile and the chord template
    pub confidence: f64,
}

/// One entry of a timed chord sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordChange {
    /// Offset from the start of the recording where this chord begins
    pub start_seconds: f64,
    pub label: String,
    pub root_pitch_class: u8,
    pub quality: ChordQuality,
    pub confidence: f64,
}

/// A single descriptor value. Serializes as a bare number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorValue {
    Number(f64),
    Text(String),
}

impl DescriptorValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DescriptorValue::Number(n) => Some(*n),
            DescriptorValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DescriptorValue::Number(_) => None,
            DescriptorValue::Text(s) => Some(s),
        }
    }
}

impl std::fmt::Display for DescriptorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorValue::Number(n) => write!(f, "{:.3}", n),
            DescriptorValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for DescriptorValue {
    fn from(value: f64) -> Self {
        DescriptorValue::Number(value)
    }
}

impl From<String> for DescriptorValue {
    fn from(value: String) -> Self {
        DescriptorValue::Text(value)
    }
}

impl From<&str> for DescriptorValue {
    fn from(value: &str) -> Self {
        DescriptorValue::Text(value.to_string())
    }
}

/// Named features of a recording, kept in insertion order.
///
/// Serializes as a JSON object whose key order matches insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Descriptors {
    entries: Vec<(String, DescriptorValue)>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key mapped to `0.0`.
    pub fn zeroed<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|k| (k.as_ref().to_string(), DescriptorValue::Number(0.0)))
            .collect()
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DescriptorValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DescriptorValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Numeric value for `key`, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(DescriptorValue::as_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DescriptorValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Descriptors
where
    K: Into<String>,
    V: Into<DescriptorValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut descriptors = Descriptors::new();
        for (k, v) in iter {
            descriptors.insert(k, v);
        }
        descriptors
    }
}

impl Serialize for Descriptors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// What a `FeatureSource` extracts from one artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Absent when the artifact carries no pitched content
    pub chroma: Option<Chromagram>,
    pub descriptors: Descriptors,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_replaces_in_place() {
        let mut d = Descriptors::new();
        d.insert("tempo", 120.0);
        d.insert("key", "C");
        d.insert("tempo", 90.0);

        let keys: Vec<_> = d.keys().collect();
        assert_eq!(keys, vec!["tempo", "key"]);
        assert_eq!(d.number("tempo"), Some(90.0));
        assert_eq!(d.number("key"), None);
        assert_eq!(d.get("key").and_then(|v| v.as_text()), Some("C"));
    }

    #[test]
    fn zeroed_covers_every_key() {
        let d = Descriptors::zeroed(["energy", "tempo"]);
        assert_eq!(d.len(), 2);
        assert!(d.iter().all(|(_, v)| *v == DescriptorValue::Number(0.0)));
    }

    #[test]
    fn serializes_as_ordered_object() {
        let d: Descriptors = [
            ("tempo", DescriptorValue::Number(128.0)),
            ("scale", DescriptorValue::from("minor")),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"tempo":128.0,"scale":"minor"}"#);
    }

    #[test]
    fn silent_chroma_has_flat_profile() {
        let chroma = Chromagram::new(vec![[0.0; 12]; 4], 0.1);
        assert_eq!(chroma.mean_profile(), [0.0; 12]);
    }

    #[test]
    fn key_label_reads_naturally() {
        let key = KeyEstimate {
            root: "Eb".into(),
            root_pitch_class: 3,
            mode: KeyMode::Major,
            confidence: 0.8,
        };
        assert_eq!(key.label(), "Eb major");
    }
}
