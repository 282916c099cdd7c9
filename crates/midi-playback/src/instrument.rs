use serde::{Deserialize, Serialize};

/// The closed palette of note-block instruments the playback side can render.
///
/// Serialized snake_case so the wire strings match the block names the
/// playback driver keys its sound map on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Planks,
    Stone,
    Sand,
    Glass,
    GoldBlock,
    Clay,
    PackedIce,
    BoneBlock,
    IronBlock,
    Pumpkin,
    EmeraldBlock,
    HayBlock,
    Glowstone,
}

impl Instrument {
    /// Map a General MIDI program (0-based) to a palette block.
    /// Unmapped programs fall back to `Planks`.
    pub fn for_program(program: u8) -> Instrument {
        match program {
            0..=7 => Instrument::Planks,        // pianos
            8 => Instrument::PackedIce,         // celesta
            9 => Instrument::Glowstone,         // glockenspiel
            10 => Instrument::GoldBlock,        // music box
            11 => Instrument::IronBlock,        // vibraphone
            12 | 13 => Instrument::BoneBlock,   // marimba, xylophone
            14 => Instrument::IronBlock,        // tubular bells
            24..=31 => Instrument::Planks,      // guitars
            32..=37 => Instrument::Planks,      // acoustic and electric basses
            38 | 39 => Instrument::EmeraldBlock, // synth basses
            72..=79 => Instrument::Clay,        // pipes
            105 => Instrument::HayBlock,        // banjo
            109 => Instrument::Pumpkin,         // bagpipe
            112 => Instrument::GoldBlock,       // tinkle bell
            _ => Instrument::Planks,
        }
    }

    /// Map a percussion key (channel 10 note number) to a palette block.
    /// Kicks hit stone, snares sand, hats and crashes glass; everything
    /// else falls back to `Planks`.
    pub fn for_percussion_key(key: u8) -> Instrument {
        match key {
            35 | 36 => Instrument::Stone,
            38 | 40 => Instrument::Sand,
            42 | 46 | 49 => Instrument::Glass,
            _ => Instrument::Planks,
        }
    }
}
