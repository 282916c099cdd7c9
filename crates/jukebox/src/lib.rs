//! Jukebox serves a directory of MIDI files as compiled playback sequences.
//!
//! The heavy lifting lives in the `midi-playback` crate; this one adds the
//! song library and the HTTP surface the playback driver polls.

pub mod library;
pub mod web;
