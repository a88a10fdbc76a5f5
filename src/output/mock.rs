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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::debug;

use crate::ump::Ump;

/// A mock output. Records what it was sent. Clones share the recording.
#[derive(Clone)]
pub struct Output {
    name: String,
    sent: Arc<Mutex<Vec<Ump>>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl Output {
    pub fn get(name: &str) -> Output {
        Output {
            name: name.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            fail_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Ump> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Makes every following send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Relaxed);
    }
}

impl super::Output for Output {
    fn send(&mut self, ump: &Ump) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(format!("output {} is closed", self.name).into());
        }
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err("mock send failure".into());
        }
        debug!(output = self.name, ump = %ump, "Mock send.");
        self.sent.lock().push(*ump);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
