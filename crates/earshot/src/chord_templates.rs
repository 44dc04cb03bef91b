use crate::types::{ChordPrediction, ChordQuality};

/// A chord template: quality + interval set from root (as bitmask over 12 pitch classes).
pub struct ChordTemplate {
    pub quality: ChordQuality,
    pub intervals: u16, // bitmask: bit i set means interval i is in the template
    pub size: usize,
}

impl ChordTemplate {
    const fn new(quality: ChordQuality, intervals: &[u8]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << intervals[i];
            i += 1;
        }
        Self {
            quality,
            intervals: mask,
            size: intervals.len(),
        }
    }

    fn contains(&self, interval: usize) -> bool {
        self.intervals & (1 << interval) != 0
    }
}

/// Recognized templates. Triads come first so an exact tie resolves to the
/// simpler chord.
pub static TEMPLATES: &[ChordTemplate] = &[
    ChordTemplate::new(ChordQuality::Major, &[0, 4, 7]),
    ChordTemplate::new(ChordQuality::Minor, &[0, 3, 7]),
    ChordTemplate::new(ChordQuality::Diminished, &[0, 3, 6]),
    ChordTemplate::new(ChordQuality::Augmented, &[0, 4, 8]),
    ChordTemplate::new(ChordQuality::Suspended4, &[0, 5, 7]),
    ChordTemplate::new(ChordQuality::Suspended2, &[0, 2, 7]),
    ChordTemplate::new(ChordQuality::Dominant7, &[0, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Major7, &[0, 4, 7, 11]),
    ChordTemplate::new(ChordQuality::Minor7, &[0, 3, 7, 10]),
    ChordTemplate::new(ChordQuality::Diminished7, &[0, 3, 6, 9]),
    ChordTemplate::new(ChordQuality::HalfDiminished7, &[0, 3, 6, 10]),
    ChordTemplate::new(ChordQuality::Power, &[0, 7]),
];

/// Minimum template similarity for a chord to be reported.
pub const MIN_SIMILARITY: f64 = 0.4;

const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Pitch classes conventionally spelled with flats.
pub static FLAT_KEY_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10];

pub fn note_name(pitch_class: u8, use_flats: bool) -> &'static str {
    let idx = (pitch_class % 12) as usize;
    if use_flats {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_SHARP[idx]
    }
}

/// Cosine similarity between a chroma profile and a binary template rooted at `root`.
fn template_similarity(profile: &[f64; 12], norm: f64, root: u8, template: &ChordTemplate) -> f64 {
    let mut dot = 0.0;
    for (pc, &energy) in profile.iter().enumerate() {
        let interval = (pc + 12 - root as usize) % 12;
        if template.contains(interval) {
            dot += energy;
        }
    }
    dot / (norm * (template.size as f64).sqrt())
}

/// Match a 12-bin chroma profile against every template at every root.
///
/// Returns `None` for a silent profile or when nothing reaches
/// [`MIN_SIMILARITY`].
pub fn match_chroma(profile: &[f64; 12], use_flats: bool) -> Option<ChordPrediction> {
    let norm = profile.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-9 {
        return None;
    }

    let mut best: Option<(u8, &ChordTemplate, f64)> = None;

    for template in TEMPLATES {
        for root in 0..12u8 {
            let score = template_similarity(profile, norm, root, template);
            if best.map_or(true, |(_, _, s)| score > s + 1e-12) {
                best = Some((root, template, score));
            }
        }
    }

    let (root, template, score) = best?;
    if score < MIN_SIMILARITY {
        return None;
    }

    Some(ChordPrediction {
        label: format!("{}{}", note_name(root, use_flats), template.quality.suffix()),
        root_pitch_class: root,
        quality: template.quality,
        confidence: score.clamp(0.0, 1.0),
    })
}
