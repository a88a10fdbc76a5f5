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
use std::time::Duration;

use spin_sleep::SpinSleeper;

/// Suspends the calling thread. The event loop calls this once per message that carries a delay.
pub trait Timer: Send + Sync {
    fn wait_seconds(&self, seconds: f64);
}

/// A timer backed by spin_sleep, which sleeps natively and spins for the final stretch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinSleepTimer {
    sleeper: SpinSleeper,
}

impl SpinSleepTimer {
    /// Creates a timer that trusts the OS sleep to the given accuracy and spins for the rest.
    pub fn with_accuracy(native_accuracy: Duration) -> SpinSleepTimer {
        let nanos = u32::try_from(native_accuracy.as_nanos()).unwrap_or(u32::MAX);
        SpinSleepTimer {
            sleeper: SpinSleeper::new(nanos),
        }
    }
}

impl Timer for SpinSleepTimer {
    fn wait_seconds(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.sleeper.sleep(Duration::from_secs_f64(seconds));
        }
    }
}
