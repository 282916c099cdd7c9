use crate::instrument::Instrument;
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_MICROSECONDS_PER_BEAT: f64 = 500_000.0;

/// A decoded MIDI file: per-track event collections with times in absolute
/// seconds, ready for compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub tracks: Vec<ScoreTrack>,
}

impl Score {
    /// Total note count across all tracks.
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

/// Events for one (source track, channel) pair. Multi-channel MIDI tracks
/// split into one score track per channel so performance state stays
/// per-channel downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreTrack {
    pub source_track: usize,
    pub channel: u8,
    pub name: Option<String>,
    pub is_percussion: bool,
    pub instrument: Instrument,
    pub notes: Vec<ScoreNote>,
    pub control_changes: Vec<ControlChange>,
    pub pitch_bends: Vec<PitchBendEvent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreNote {
    pub time: f64,
    pub duration: f64,
    pub pitch: u8,
    /// Normalized to 0.0..=1.0.
    pub velocity: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlChange {
    pub time: f64,
    pub controller: u8,
    /// Normalized to 0.0..=1.0.
    pub value: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PitchBendEvent {
    pub time: f64,
    /// Normalized to -1.0..=1.0, centered on 0.
    pub value: f32,
}

/// Piecewise tick→seconds conversion built from the file's tempo events.
struct TempoMap {
    // (start tick, seconds at start tick, microseconds per beat from there on)
    segments: Vec<(u64, f64, f64)>,
    ppq: f64,
}

impl TempoMap {
    fn new(ppq: u16, tempo_changes: &[(u64, u32)]) -> TempoMap {
        let ppq = ppq as f64;
        let mut segments = vec![(0u64, 0.0, DEFAULT_MICROSECONDS_PER_BEAT)];
        let mut seconds = 0.0;
        let mut last_tick = 0u64;
        let mut last_usec = DEFAULT_MICROSECONDS_PER_BEAT;

        for &(tick, usec) in tempo_changes {
            seconds += (tick - last_tick) as f64 * last_usec / (ppq * 1_000_000.0);
            last_tick = tick;
            last_usec = usec as f64;
            segments.push((tick, seconds, last_usec));
        }

        TempoMap { segments, ppq }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        // Last segment starting at or before the tick; segments[0] covers
        // everything from tick 0.
        let seg = self
            .segments
            .iter()
            .rev()
            .find(|(start, _, _)| *start <= tick)
            .unwrap_or(&self.segments[0]);
        seg.1 + (tick - seg.0) as f64 * seg.2 / (self.ppq * 1_000_000.0)
    }
}

#[derive(Default)]
struct PartialTrack {
    program: Option<u8>,
    notes: Vec<ScoreNote>,
    control_changes: Vec<ControlChange>,
    pitch_bends: Vec<PitchBendEvent>,
}

/// Decode Standard MIDI File bytes into a [`Score`], pairing note-on/note-off
/// events and converting ticks to seconds through the file's tempo map.
pub fn decode_score(bytes: &[u8]) -> crate::Result<Score> {
    let smf = Smf::parse(bytes).map_err(|e| crate::Error::MidiParse(e.to_string()))?;

    let ppq = match smf.header.timing {
        midly::Timing::Metrical(ticks) => ticks.as_int(),
        midly::Timing::Timecode(_, _) => 480,
    };

    // Tempo events usually live on track 0 of a format-1 file while the notes
    // live elsewhere, so the map has to be global before any conversion.
    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    for track in &smf.tracks {
        let mut current_tick: u64 = 0;
        for event in track {
            current_tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempo_changes.push((current_tick, tempo.as_int()));
            }
        }
    }
    tempo_changes.sort_by_key(|t| t.0);
    tempo_changes.dedup();

    let tempo_map = TempoMap::new(ppq, &tempo_changes);

    let mut tracks: Vec<ScoreTrack> = Vec::new();

    for (source_track, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        let mut name: Option<String> = None;
        // Map (channel, pitch) → Vec<(onset_tick, velocity)> for stacking
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        let mut partial: HashMap<u8, PartialTrack> = HashMap::new();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    name = String::from_utf8(raw.to_vec()).ok();
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    let part = partial.entry(ch).or_default();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((current_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            // vel=0 NoteOn is NoteOff
                            if let Some(stack) = pending.get_mut(&(ch, key.as_int())) {
                                if let Some((onset, velocity)) = stack.pop() {
                                    let start = tempo_map.seconds_at(onset);
                                    let end = tempo_map.seconds_at(current_tick);
                                    part.notes.push(ScoreNote {
                                        time: start,
                                        duration: end - start,
                                        pitch: key.as_int(),
                                        velocity: velocity as f32 / 127.0,
                                    });
                                }
                            }
                        }
                        MidiMessage::Controller { controller, value } => {
                            part.control_changes.push(ControlChange {
                                time: tempo_map.seconds_at(current_tick),
                                controller: controller.as_int(),
                                value: value.as_int() as f32 / 127.0,
                            });
                        }
                        MidiMessage::PitchBend { bend } => {
                            part.pitch_bends.push(PitchBendEvent {
                                time: tempo_map.seconds_at(current_tick),
                                value: bend.as_f32(),
                            });
                        }
                        MidiMessage::ProgramChange { program } => {
                            if part.program.is_none() {
                                part.program = Some(program.as_int());
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Close any unclosed notes at the track's final tick
        for ((ch, pitch), stack) in pending {
            let part = partial.entry(ch).or_default();
            for (onset, velocity) in stack {
                let start = tempo_map.seconds_at(onset);
                let end = tempo_map.seconds_at(current_tick);
                part.notes.push(ScoreNote {
                    time: start,
                    duration: end - start,
                    pitch,
                    velocity: velocity as f32 / 127.0,
                });
            }
        }

        let mut channels: Vec<(u8, PartialTrack)> = partial.into_iter().collect();
        channels.sort_by_key(|(ch, _)| *ch);

        for (channel, mut part) in channels {
            if part.notes.is_empty() && part.control_changes.is_empty() && part.pitch_bends.is_empty()
            {
                continue;
            }
            part.notes
                .sort_by(|a, b| a.time.total_cmp(&b.time).then(a.pitch.cmp(&b.pitch)));
            tracks.push(ScoreTrack {
                source_track,
                channel,
                name: name.clone(),
                is_percussion: channel == 9,
                instrument: Instrument::for_program(part.program.unwrap_or(0)),
                notes: part.notes,
                control_changes: part.control_changes,
                pitch_bends: part.pitch_bends,
            });
        }
    }

    Ok(Score { tracks })
}
