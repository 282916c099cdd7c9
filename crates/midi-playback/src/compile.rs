use crate::event::{normalize_events, RawEvent};
use crate::instrument::Instrument;
use crate::score::Score;
use crate::TICKS_PER_SECOND;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Parameters for the advanced compilation path.
#[derive(Debug, Clone)]
pub struct CompileParams {
    /// Per-tick cap on simultaneously triggered notes.
    pub max_polyphony: usize,
}

impl Default for CompileParams {
    fn default() -> Self {
        CompileParams { max_polyphony: 8 }
    }
}

/// One playback trigger, consumed tick by tick by the playback loop.
/// Serialized camelCase to match the wire shape the playback driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCommand {
    pub tick: u32,
    pub instrument: Instrument,
    pub pitch: u8,
    pub velocity: f32,
    pub pan: f32,
    pub volume: f32,
    pub pitch_bend: f32,
}

/// Mutable per-track performance state, updated in event-time order.
#[derive(Debug, Clone)]
struct TrackState {
    volume: f32,
    pan: f32,
    pitch_bend: f32,
    sustain: bool,
    held_pitches: HashSet<u8>,
}

impl Default for TrackState {
    fn default() -> Self {
        TrackState {
            volume: 1.0,
            pan: 0.5,
            pitch_bend: 0.0,
            sustain: false,
            held_pitches: HashSet::new(),
        }
    }
}

/// The slice of track state a note captures when it starts. Later state
/// changes must not retroactively alter an already-sounding note.
#[derive(Debug, Clone, Copy)]
struct StateSnapshot {
    volume: f32,
    pan: f32,
    pitch_bend: f32,
}

#[derive(Debug, Clone, Copy)]
struct ActiveNote {
    track: usize,
    pitch: u8,
    velocity: f32,
    duration: f64,
    instrument: Instrument,
    state: StateSnapshot,
}

/// Insertion-ordered (track, pitch) → note map. Re-inserting an existing key
/// replaces the note but keeps its original position; snapshot order and
/// capper tie-breaks depend on that.
#[derive(Default)]
struct ActiveNotes {
    notes: Vec<ActiveNote>,
}

impl ActiveNotes {
    fn upsert(&mut self, note: ActiveNote) {
        match self
            .notes
            .iter_mut()
            .find(|n| n.track == note.track && n.pitch == note.pitch)
        {
            Some(slot) => *slot = note,
            None => self.notes.push(note),
        }
    }

    fn remove(&mut self, track: usize, pitch: u8) {
        self.notes.retain(|n| !(n.track == track && n.pitch == pitch));
    }

    fn snapshot(&self) -> Vec<ActiveNote> {
        self.notes.clone()
    }
}

/// Priority for over-capacity ticks: louder notes win, with a length bonus
/// capped at two seconds worth of ticks.
fn priority(note: &ActiveNote) -> f64 {
    note.velocity as f64 * 5.0 + (note.duration * TICKS_PER_SECOND).min(40.0)
}

/// Truncate one tick's notes to the cap, keeping the highest-priority ones.
/// Stable, so equal priorities keep their pre-sort order; buckets at or under
/// the cap pass through untouched.
fn cap_bucket(notes: &mut Vec<ActiveNote>, max_polyphony: usize) {
    if notes.len() <= max_polyphony {
        return;
    }
    notes.sort_by(|a, b| priority(b).total_cmp(&priority(a)));
    notes.truncate(max_polyphony);
}

/// Compile a score into the advanced command sequence: normalize events, run
/// the per-track state machines, snapshot the active set at every event tick,
/// cap each tick's polyphony, then flatten ascending by tick.
pub fn compile_sequence(score: &Score, params: &CompileParams) -> Vec<PlaybackCommand> {
    let events = normalize_events(score);

    let mut states: Vec<TrackState> = (0..score.tracks.len())
        .map(|_| TrackState::default())
        .collect();
    let mut active = ActiveNotes::default();
    let mut buckets: BTreeMap<u32, Vec<ActiveNote>> = BTreeMap::new();

    for event in &events {
        let tick = (event.time() * TICKS_PER_SECOND).round() as u32;

        match *event {
            RawEvent::NoteOn {
                track,
                pitch,
                velocity,
                duration,
                instrument,
                ..
            } => {
                let state = &states[track];
                active.upsert(ActiveNote {
                    track,
                    pitch,
                    velocity,
                    duration,
                    instrument,
                    state: StateSnapshot {
                        volume: state.volume,
                        pan: state.pan,
                        pitch_bend: state.pitch_bend,
                    },
                });
            }
            RawEvent::NoteOff { track, pitch, .. } => {
                let state = &mut states[track];
                if state.sustain {
                    state.held_pitches.insert(pitch);
                } else {
                    active.remove(track, pitch);
                }
            }
            RawEvent::ControlChange {
                track,
                controller,
                value,
                ..
            } => {
                let state = &mut states[track];
                match controller {
                    7 => state.volume = value,
                    10 => state.pan = value,
                    64 => {
                        let sustain = value > 0.5;
                        if state.sustain && !sustain {
                            for pitch in state.held_pitches.drain() {
                                active.remove(track, pitch);
                            }
                        }
                        state.sustain = sustain;
                    }
                    _ => {}
                }
            }
            RawEvent::PitchBend { track, value, .. } => {
                states[track].pitch_bend = value;
            }
        }

        // Last event at a tick wins: the bucket becomes the full active set
        // after this event, not an accumulation across the tick.
        buckets.insert(tick, active.snapshot());
    }

    for notes in buckets.values_mut() {
        cap_bucket(notes, params.max_polyphony);
    }

    buckets
        .into_iter()
        .flat_map(|(tick, notes)| {
            notes.into_iter().map(move |note| PlaybackCommand {
                tick,
                instrument: note.instrument,
                pitch: note.pitch,
                velocity: note.velocity,
                pan: note.state.pan,
                volume: note.state.volume,
                pitch_bend: note.state.pitch_bend,
            })
        })
        .collect()
}
