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
use std::{error::Error, fmt};

use crate::ump::Ump;

#[cfg(test)]
mod mock;

/// A destination for UMP packets, such as a MIDI 2.0 device connection.
pub trait Output: fmt::Display + Send {
    /// Sends a single packet.
    fn send(&mut self, ump: &Ump) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Closes the output. Nothing is sent after this.
    fn close(&mut self) -> Result<(), Box<dyn Error + Send + Sync>>;
}
