// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Universal MIDI Packet model. Packets are stored as big-endian 32-bit words and
//! every field is derived from the words on demand.

use std::fmt;

/// The largest delta a single JR timestamp packet can carry.
pub const MAX_TIMESTAMP_DELTA: u32 = 0xFFFF;

/// The top-level UMP packet kind, taken from bits 28-30 of the first word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Utility,
    System,
    Midi1,
    Sysex7,
    Midi2,
    Sysex8Mds,
    Reserved6,
    Reserved7,
}

impl Category {
    /// Maps the low three bits of the given value to a category.
    pub fn from_bits(bits: u8) -> Category {
        match bits & 0x7 {
            0 => Category::Utility,
            1 => Category::System,
            2 => Category::Midi1,
            3 => Category::Sysex7,
            4 => Category::Midi2,
            5 => Category::Sysex8Mds,
            6 => Category::Reserved6,
            _ => Category::Reserved7,
        }
    }

    /// The numeric value of the category as it appears on the wire.
    pub fn bits(self) -> u8 {
        match self {
            Category::Utility => 0,
            Category::System => 1,
            Category::Midi1 => 2,
            Category::Sysex7 => 3,
            Category::Midi2 => 4,
            Category::Sysex8Mds => 5,
            Category::Reserved6 => 6,
            Category::Reserved7 => 7,
        }
    }

    /// The number of 32-bit words a packet of this category occupies.
    pub fn word_count(self) -> usize {
        match self {
            Category::Sysex7 | Category::Midi2 => 2,
            Category::Sysex8Mds => 4,
            _ => 1,
        }
    }

    /// True if the low nibble of the status byte is a channel.
    fn has_channel(self) -> bool {
        matches!(self, Category::Midi1 | Category::Midi2 | Category::System)
    }
}

/// Status byte values for UTILITY packets.
pub mod utility {
    pub const NOOP: u8 = 0x00;
    pub const JR_CLOCK: u8 = 0x10;
    pub const JR_TIMESTAMP: u8 = 0x20;
}

/// Channel voice event types (high nibble of the status byte).
pub mod event_type {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
}

/// Bytes of the MIDI-CI protocol negotiation payload.
pub mod ci_protocol {
    pub const BYTE_TYPE: usize = 0;
    pub const BYTE_VERSION: usize = 1;
    pub const BYTE_EXTENSIONS: usize = 2;

    pub const TYPE_MIDI1: u8 = 1;
    pub const TYPE_MIDI2: u8 = 2;

    pub const VALUE_MIDI1: u8 = 0;
    pub const VALUE_MIDI2_V1: u8 = 0;

    pub const EXTENSION_JITTER: u8 = 1;
    pub const EXTENSION_LARGER: u8 = 2;
}

/// Flags for the per-note management message.
pub mod per_note_management {
    pub const RESET: u8 = 1;
    pub const DETACH: u8 = 2;
}

/// Registered per-note controller numbers.
pub mod per_note_rcc {
    pub const MODULATION: u8 = 0x01;
    pub const BREATH: u8 = 0x02;
    pub const PITCH_7_25: u8 = 0x03;
    pub const VOLUME: u8 = 0x07;
    pub const BALANCE: u8 = 0x08;
    pub const PAN: u8 = 0x0A;
    pub const EXPRESSION: u8 = 0x0B;
    pub const SOUND_CONTROLLER_1: u8 = 0x46;
    pub const SOUND_CONTROLLER_2: u8 = 0x47;
    pub const SOUND_CONTROLLER_3: u8 = 0x48;
    pub const SOUND_CONTROLLER_4: u8 = 0x49;
    pub const SOUND_CONTROLLER_5: u8 = 0x4A;
    pub const SOUND_CONTROLLER_6: u8 = 0x4B;
    pub const SOUND_CONTROLLER_7: u8 = 0x4C;
    pub const SOUND_CONTROLLER_8: u8 = 0x4D;
    pub const SOUND_CONTROLLER_9: u8 = 0x4E;
    pub const SOUND_CONTROLLER_10: u8 = 0x4F;
    /// Reverb send level by default.
    pub const EFFECT_1_DEPTH: u8 = 0x5B;
    pub const EFFECT_2_DEPTH: u8 = 0x5C;
    /// Chorus send level by default.
    pub const EFFECT_3_DEPTH: u8 = 0x5D;
    pub const EFFECT_4_DEPTH: u8 = 0x5E;
    pub const EFFECT_5_DEPTH: u8 = 0x5F;
}

/// A single Universal MIDI Packet. Words beyond `word_count()` are zero for
/// packets built from fewer words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ump {
    words: [u32; 4],
}

impl Ump {
    /// Creates a one word packet.
    pub fn new(word1: u32) -> Ump {
        Ump {
            words: [word1, 0, 0, 0],
        }
    }

    /// Creates a two word packet.
    pub fn new64(word1: u32, word2: u32) -> Ump {
        Ump {
            words: [word1, word2, 0, 0],
        }
    }

    /// Creates a packet from all four words.
    pub fn from_words(words: [u32; 4]) -> Ump {
        Ump { words }
    }

    /// Creates a JR timestamp packet on the given group. Values wider than 16 bits are truncated.
    pub fn jr_timestamp(group: u8, delta: u32) -> Ump {
        Ump::new(
            (u32::from(group & 0xF) << 24)
                | (u32::from(utility::JR_TIMESTAMP) << 16)
                | (delta & MAX_TIMESTAMP_DELTA),
        )
    }

    /// The words that make up this packet, sized by its category.
    pub fn words(&self) -> &[u32] {
        &self.words[..self.word_count()]
    }

    pub fn word1(&self) -> u32 {
        self.words[0]
    }

    pub fn word2(&self) -> u32 {
        self.words[1]
    }

    pub fn word3(&self) -> u32 {
        self.words[2]
    }

    pub fn word4(&self) -> u32 {
        self.words[3]
    }

    /// The first byte: category and group together.
    pub fn group_byte(&self) -> u8 {
        (self.words[0] >> 24) as u8
    }

    pub fn category(&self) -> Category {
        Category::from_bits((self.words[0] >> 28) as u8)
    }

    pub fn word_count(&self) -> usize {
        self.category().word_count()
    }

    pub fn group(&self) -> u8 {
        ((self.words[0] >> 24) & 0xF) as u8
    }

    pub fn status_byte(&self) -> u8 {
        ((self.words[0] >> 16) & 0xFF) as u8
    }

    /// The event type. Channel carrying categories drop the channel nibble, others use
    /// the whole status byte.
    pub fn event_type(&self) -> u8 {
        if self.category().has_channel() {
            self.status_byte() & 0xF0
        } else {
            self.status_byte()
        }
    }

    /// Only meaningful for MIDI1, MIDI2 and SYSTEM packets.
    pub fn channel_in_group(&self) -> u8 {
        self.status_byte() & 0xF
    }

    /// Group and channel combined into a single 0-255 value.
    pub fn group_and_channel(&self) -> u8 {
        (self.group() << 4) | self.channel_in_group()
    }

    /// Third byte of the first word.
    pub fn midi1_msb(&self) -> u8 {
        ((self.words[0] >> 8) & 0xFF) as u8
    }

    /// Fourth byte of the first word.
    pub fn midi1_lsb(&self) -> u8 {
        (self.words[0] & 0xFF) as u8
    }

    pub fn is_jr_timestamp(&self) -> bool {
        self.category() == Category::Utility && self.event_type() == utility::JR_TIMESTAMP
    }

    /// The delta carried by a JR timestamp, or 0 for any other packet.
    pub fn jr_timestamp_value(&self) -> u32 {
        if self.is_jr_timestamp() {
            (u32::from(self.midi1_msb()) << 8) | u32::from(self.midi1_lsb())
        } else {
            0
        }
    }

    /// Returns the JR timestamp packets that encode the given delta, on this packet's group.
    pub fn timestamps_for(&self, delta: u32) -> Timestamps {
        Timestamps::new(self.group(), delta)
    }
}

impl fmt::Display for Ump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self
            .words()
            .iter()
            .map(|word| format!("{:x}", word))
            .collect::<Vec<String>>();
        write!(f, "[{}]", words.join(":"))
    }
}

/// A finite iterator of JR timestamp packets whose values sum to the requested delta.
/// Cloning it restarts from the current position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timestamps {
    group: u8,
    remaining: u32,
}

impl Timestamps {
    pub fn new(group: u8, delta: u32) -> Timestamps {
        Timestamps {
            group: group & 0xF,
            remaining: delta,
        }
    }
}

impl Iterator for Timestamps {
    type Item = Ump;

    fn next(&mut self) -> Option<Ump> {
        if self.remaining == 0 {
            return None;
        }

        let chunk = self.remaining.min(MAX_TIMESTAMP_DELTA);
        self.remaining -= chunk;
        Some(Ump::jr_timestamp(self.group, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.remaining.div_ceil(MAX_TIMESTAMP_DELTA) as usize;
        (count, Some(count))
    }
}

impl ExactSizeIterator for Timestamps {}
