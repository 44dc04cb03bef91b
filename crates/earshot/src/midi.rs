//! MIDI note extraction and pitch-class chroma.

use std::collections::HashMap;

use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};

use crate::types::Chromagram;
use crate::AnalysisError;

/// Channel 10 in 1-based numbering; percussion has no pitch class.
const DRUM_CHANNEL: u8 = 9;

const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

/// Longest span, in beats, a file may cover before chroma is refused.
/// At 120 BPM this is a little over nine hours.
pub const MAX_CHROMA_BEATS: u64 = 1 << 16;

/// A single MIDI note with absolute tick timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedNote {
    pub onset_tick: u64,
    pub offset_tick: u64,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
}

impl TimedNote {
    pub fn duration_ticks(&self) -> u64 {
        self.offset_tick.saturating_sub(self.onset_tick)
    }
}

/// Timing facts needed to place notes in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiTiming {
    pub ppq: u16,
    /// First tempo event, or 120 BPM when the file has none
    pub microseconds_per_beat: u32,
    pub total_ticks: u64,
}

impl MidiTiming {
    pub fn seconds_per_beat(&self) -> f64 {
        self.microseconds_per_beat as f64 / 1_000_000.0
    }
}

/// Extract all notes from a parsed SMF.
///
/// NoteOn with velocity 0 is treated as NoteOff. Notes still sounding at
/// the end of their track are closed at the track's last tick.
pub fn extract_notes(smf: &Smf) -> (Vec<TimedNote>, MidiTiming) {
    let ppq = match smf.header.timing {
        midly::Timing::Metrical(ticks) => ticks.as_int(),
        midly::Timing::Timecode(_, _) => 480,
    };

    let mut notes = Vec::new();
    let mut tempo: Option<u32> = None;
    let mut total_ticks: u64 = 0;

    for track in &smf.tracks {
        let mut current_tick: u64 = 0;
        // Map (channel, pitch) → stack of (onset_tick, velocity)
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    tempo.get_or_insert(t.as_int());
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((current_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            let slot = (ch, key.as_int());
                            if let Some((onset, velocity)) =
                                pending.get_mut(&slot).and_then(|stack| stack.pop())
                            {
                                notes.push(TimedNote {
                                    onset_tick: onset,
                                    offset_tick: current_tick,
                                    pitch: slot.1,
                                    velocity,
                                    channel: ch,
                                });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }

            total_ticks = total_ticks.max(current_tick);
        }

        for ((ch, pitch), stack) in pending {
            for (onset, velocity) in stack {
                notes.push(TimedNote {
                    onset_tick: onset,
                    offset_tick: current_tick,
                    pitch,
                    velocity,
                    channel: ch,
                });
            }
        }
    }

    notes.sort_by_key(|n| (n.onset_tick, n.pitch));

    let timing = MidiTiming {
        ppq,
        microseconds_per_beat: tempo.unwrap_or(DEFAULT_MICROSECONDS_PER_BEAT),
        total_ticks,
    };
    (notes, timing)
}

/// Duration-weighted pitch-class chroma with one frame per beat.
///
/// Returns `None` when no pitched note has a positive duration, and an
/// error when the file spans more than `MAX_CHROMA_BEATS`.
pub fn notes_to_chroma(
    notes: &[TimedNote],
    timing: &MidiTiming,
) -> Result<Option<Chromagram>, AnalysisError> {
    let pitched: Vec<&TimedNote> = notes
        .iter()
        .filter(|n| n.channel != DRUM_CHANNEL && n.duration_ticks() > 0)
        .collect();
    if pitched.is_empty() {
        return Ok(None);
    }

    let ppq = timing.ppq.max(1) as u64;
    let end_tick = pitched
        .iter()
        .map(|n| n.offset_tick)
        .max()
        .unwrap_or(0)
        .max(timing.total_ticks);
    let beats = end_tick.div_ceil(ppq).max(1);
    if beats > MAX_CHROMA_BEATS {
        return Err(AnalysisError::Analysis(format!(
            "MIDI spans {} beats, limit is {}",
            beats, MAX_CHROMA_BEATS
        )));
    }
    let beat_count = beats as usize;
    let mut frames = vec![[0.0_f64; 12]; beat_count];

    for note in pitched {
        let pc = (note.pitch % 12) as usize;
        let first_beat = (note.onset_tick / ppq) as usize;
        let last_beat = ((note.offset_tick - 1) / ppq) as usize;
        for (beat, frame) in frames
            .iter_mut()
            .enumerate()
            .take(last_beat + 1)
            .skip(first_beat)
        {
            let beat_start = beat as u64 * ppq;
            let beat_end = beat_start + ppq;
            let overlap = note.offset_tick.min(beat_end) - note.onset_tick.max(beat_start);
            frame[pc] += overlap as f64 / ppq as f64;
        }
    }

    Ok(Some(Chromagram::new(frames, timing.seconds_per_beat())))
}
