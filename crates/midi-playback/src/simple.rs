use crate::score::Score;
use crate::TICKS_PER_SECOND;
use serde::{Deserialize, Serialize};

/// Minimal note-only playback record for the simple path: no state tracking,
/// no polyphony control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleNote {
    pub tick: u32,
    /// Offset from the bottom of the note-block range (MIDI 54), folded into
    /// 0..=24 by octaves.
    pub pitch: u8,
    pub velocity: f32,
}

/// Extract every note of every track, percussion included: quantize the
/// onset, fold the pitch into the playable range, keep the velocity
/// unchanged. Output is sorted ascending by tick, stable for ties.
pub fn extract_simple_notes(score: &Score) -> Vec<SimpleNote> {
    let mut notes: Vec<SimpleNote> = Vec::new();

    for track in &score.tracks {
        for note in &track.notes {
            let tick = (note.time * TICKS_PER_SECOND).round() as u32;
            let mut pitch = note.pitch as i16 - 54;
            while pitch < 0 {
                pitch += 12;
            }
            while pitch > 24 {
                pitch -= 12;
            }
            notes.push(SimpleNote {
                tick,
                pitch: pitch as u8,
                velocity: note.velocity,
            });
        }
    }

    notes.sort_by(|a, b| a.tick.cmp(&b.tick));
    notes
}
