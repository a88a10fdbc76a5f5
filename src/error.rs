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
use std::error::Error;

/// Errors reported by the event looper and the player built on it.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("unable to spawn the event loop thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("the event loop thread exited before signalling that it started")]
    LoopStart,
    #[error("the event loop thread panicked")]
    LoopPanicked,
    #[error("error closing output {name}: {source}")]
    OutputClose {
        name: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}
