pub mod clarity;
pub mod compile;
pub mod event;
pub mod instrument;
pub mod score;
pub mod simple;

pub use clarity::{reschedule_for_clarity, ClarityParams};
pub use compile::{compile_sequence, CompileParams, PlaybackCommand};
pub use event::{normalize_events, RawEvent};
pub use instrument::Instrument;
pub use score::{decode_score, ControlChange, PitchBendEvent, Score, ScoreNote, ScoreTrack};
pub use simple::{extract_simple_notes, SimpleNote};

/// Playback runs on a fixed 20 Hz trigger loop; all quantization uses this grain.
pub const TICKS_PER_SECOND: f64 = 20.0;

/// Errors from MIDI playback compilation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
