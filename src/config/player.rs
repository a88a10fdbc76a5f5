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
use std::{path::Path, time::Duration};

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::{looper::SpinSleepTimer, music::DEFAULT_TEMPO};

/// How much of a timed wait is left to the OS sleep before spinning.
const DEFAULT_TIMER_ACCURACY: Duration = Duration::from_millis(1);

/// A YAML representation of the player configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PlayerConfig {
    /// The starting tempo in microseconds per quarter note.
    tempo: Option<u32>,

    /// The playback speed multiplier.
    tempo_change_ratio: Option<f64>,

    /// Group and channel keys (group << 4 | channel) that are not delivered.
    muted_channels: Option<Vec<u8>>,

    /// The native sleep accuracy handed to the timer, e.g. "1ms".
    timer_accuracy: Option<String>,
}

impl PlayerConfig {
    /// Parses a player configuration from a file. The format follows the extension.
    pub fn deserialize(path: &Path) -> Result<PlayerConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<PlayerConfig>()?)
    }

    /// Parses a player configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<PlayerConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<PlayerConfig>()?)
    }

    pub fn tempo(&self) -> Result<u32, ConfigError> {
        match self.tempo {
            Some(0) => Err(ConfigError::Tempo),
            Some(tempo) => Ok(tempo),
            None => Ok(DEFAULT_TEMPO),
        }
    }

    pub fn tempo_change_ratio(&self) -> Result<f64, ConfigError> {
        match self.tempo_change_ratio {
            Some(ratio) if !ratio.is_finite() || ratio <= 0.0 => {
                Err(ConfigError::TempoChangeRatio(ratio))
            }
            Some(ratio) => Ok(ratio),
            None => Ok(1.0),
        }
    }

    pub fn muted_channels(&self) -> Vec<u8> {
        self.muted_channels.clone().unwrap_or_default()
    }

    pub fn timer_accuracy(&self) -> Result<Duration, ConfigError> {
        match &self.timer_accuracy {
            Some(accuracy) => Ok(DurationString::from_string(accuracy.clone())
                .map_err(|e| ConfigError::Duration {
                    value: accuracy.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_TIMER_ACCURACY),
        }
    }

    /// Builds the timer described by this configuration.
    pub fn timer(&self) -> Result<SpinSleepTimer, ConfigError> {
        Ok(SpinSleepTimer::with_accuracy(self.timer_accuracy()?))
    }
}
