use crate::instrument::Instrument;
use crate::score::Score;

/// One normalized performance event, flattened out of the per-track score
/// collections. Track is the index into the score's track list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawEvent {
    NoteOn {
        time: f64,
        track: usize,
        pitch: u8,
        velocity: f32,
        duration: f64,
        instrument: Instrument,
    },
    NoteOff {
        time: f64,
        track: usize,
        pitch: u8,
    },
    ControlChange {
        time: f64,
        track: usize,
        controller: u8,
        value: f32,
    },
    PitchBend {
        time: f64,
        track: usize,
        value: f32,
    },
}

impl RawEvent {
    pub fn time(&self) -> f64 {
        match self {
            RawEvent::NoteOn { time, .. }
            | RawEvent::NoteOff { time, .. }
            | RawEvent::ControlChange { time, .. }
            | RawEvent::PitchBend { time, .. } => *time,
        }
    }
}

/// Flatten a score into one list of events sorted ascending by time. Each
/// note contributes a NoteOn at its start and a NoteOff at start + duration.
/// The sort is stable, so events sharing a time keep construction order:
/// per track, note on/off pairs in note order, then control changes, then
/// pitch bends.
pub fn normalize_events(score: &Score) -> Vec<RawEvent> {
    let mut events = Vec::new();

    for (track, t) in score.tracks.iter().enumerate() {
        for note in &t.notes {
            let instrument = if t.is_percussion {
                Instrument::for_percussion_key(note.pitch)
            } else {
                t.instrument
            };
            events.push(RawEvent::NoteOn {
                time: note.time,
                track,
                pitch: note.pitch,
                velocity: note.velocity,
                duration: note.duration,
                instrument,
            });
            events.push(RawEvent::NoteOff {
                time: note.time + note.duration,
                track,
                pitch: note.pitch,
            });
        }
        for cc in &t.control_changes {
            events.push(RawEvent::ControlChange {
                time: cc.time,
                track,
                controller: cc.controller,
                value: cc.value,
            });
        }
        for bend in &t.pitch_bends {
            events.push(RawEvent::PitchBend {
                time: bend.time,
                track,
                value: bend.value,
            });
        }
    }

    events.sort_by(|a, b| a.time().total_cmp(&b.time()));
    events
}
