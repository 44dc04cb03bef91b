use crate::chord_templates::match_chroma;
use crate::types::{summed_profile, ChordChange, ChordPrediction, Chromagram};

/// Length of one progression segment.
pub const SEGMENT_SECONDS: f64 = 0.5;

/// Best single chord for the whole chromagram.
pub fn estimate_chord(chroma: &Chromagram, use_flats: bool) -> Option<ChordPrediction> {
    if chroma.is_empty() {
        return None;
    }
    match_chroma(&chroma.mean_profile(), use_flats)
}

/// Timed chord sequence over fixed-length segments.
///
/// Each segment's frames are averaged and matched against the templates.
/// Consecutive identical chords are deduplicated and segments without a
/// match are skipped.
pub fn extract_progression(chroma: &Chromagram, use_flats: bool) -> Vec<ChordChange> {
    if chroma.is_empty() || chroma.frame_seconds() <= 0.0 {
        return Vec::new();
    }

    let frames_per_segment = ((SEGMENT_SECONDS / chroma.frame_seconds()).round() as usize).max(1);
    let mut changes: Vec<ChordChange> = Vec::new();

    for (index, segment) in chroma.frames().chunks(frames_per_segment).enumerate() {
        let Some(chord) = match_chroma(&summed_profile(segment), use_flats) else {
            continue;
        };

        if changes.last().map(|c| &c.label) == Some(&chord.label) {
            continue;
        }

        changes.push(ChordChange {
            start_seconds: (index * frames_per_segment) as f64 * chroma.frame_seconds(),
            label: chord.label,
            root_pitch_class: chord.root_pitch_class,
            quality: chord.quality,
            confidence: chord.confidence,
        });
    }

    changes
}
