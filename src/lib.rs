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

//! Plays MIDI 2.0 Universal MIDI Packet music in real time.
//!
//! Music is a set of UMP tracks timed by JR timestamps. Tracks can be merged into a single
//! time-ordered track or split into one track per group and channel. A [player::Midi2Player]
//! drives a merged track through an [output::Output] on a background event loop.

pub mod config;
pub mod error;
pub mod looper;
pub mod music;
pub mod output;
pub mod player;
pub mod ump;
mod util;

#[cfg(test)]
mod testutil;

pub use error::PlayerError;
pub use music::{merge, split, Music, Track};
pub use player::Midi2Player;
pub use ump::Ump;
