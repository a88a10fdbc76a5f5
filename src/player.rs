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
    collections::{BTreeSet, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level, Span};

use crate::{
    config::{ConfigError, PlayerConfig},
    error::PlayerError,
    looper::{
        EventLooper, EventSequence, PlaybackContext, PlaybackEvent, PlayerState,
        SeekFilterResult, SeekProcessor, Timer,
    },
    music::{self, merge, Music, FORMAT_MERGED},
    output::Output,
    ump::{event_type, Category, Ump},
    util::position_display,
};

/// The All Notes Off controller number.
const ALL_NOTES_OFF: u8 = 0x7B;

/// Builds a MIDI 2.0 All Notes Off control change for the given group and channel.
fn all_notes_off(group: u8, channel: u8) -> Ump {
    Ump::new64(
        0x40B0_0000
            | (u32::from(group & 0xF) << 24)
            | (u32::from(channel & 0xF) << 16)
            | (u32::from(ALL_NOTES_OFF) << 8),
        0,
    )
}

/// True for MIDI 1.0 and MIDI 2.0 channel voice packets.
fn is_channel_message(ump: &Ump) -> bool {
    matches!(ump.category(), Category::Midi1 | Category::Midi2)
}

fn is_note(ump: &Ump) -> bool {
    is_channel_message(ump)
        && matches!(ump.event_type(), event_type::NOTE_ON | event_type::NOTE_OFF)
}

/// A merged UMP track played through an output. JR timestamps are in milliseconds.
pub struct UmpSequence {
    messages: Vec<Ump>,
    output: Arc<Mutex<dyn Output>>,
    /// Groups that carry channel messages, which are the ones muting has to cover.
    groups: BTreeSet<u8>,
    muted_channels: HashSet<u8>,
}

impl UmpSequence {
    fn new(messages: Vec<Ump>, output: Arc<Mutex<dyn Output>>) -> UmpSequence {
        let groups = messages
            .iter()
            .filter(|ump| is_channel_message(ump))
            .map(|ump| ump.group())
            .collect();
        UmpSequence {
            messages,
            output,
            groups,
            muted_channels: HashSet::new(),
        }
    }

    fn send(&self, ump: &Ump) {
        let mut output = self.output.lock();
        if let Err(e) = output.send(ump) {
            error!(output = %output, ump = %ump, err = %e, "Error sending packet.");
        }
    }
}

impl EventSequence for UmpSequence {
    type Message = Ump;

    fn is_at_end(&self, index: usize) -> bool {
        index >= self.messages.len()
    }

    fn message_at(&self, index: usize) -> Ump {
        self.messages[index]
    }

    fn delta_seconds(&self, ump: &Ump, context: &PlaybackContext) -> f64 {
        if !ump.is_jr_timestamp() {
            return 0.0;
        }
        f64::from(ump.jr_timestamp_value()) / 1000.0 / context.tempo_ratio()
    }

    fn duration_of(&self, ump: &Ump) -> u64 {
        u64::from(ump.jr_timestamp_value())
    }

    fn update_tempo_and_time_signature(&self, ump: &Ump, context: &PlaybackContext) {
        if let Some(tempo) = music::tempo_of(ump) {
            context.set_tempo(tempo);
        } else if let Some(time_signature) = music::time_signature_of(ump) {
            context.set_time_signature(time_signature);
        }
    }

    fn on_event(&mut self, ump: Ump) {
        // Timing has already been realised and meta events stay inside the player.
        if ump.is_jr_timestamp() || music::is_any_meta_event(&ump) {
            return;
        }
        if is_channel_message(&ump) && self.muted_channels.contains(&ump.group_and_channel()) {
            return;
        }
        self.send(&ump);
    }

    fn mute(&mut self) {
        for group in self.groups.iter() {
            for channel in 0..16 {
                self.send(&all_notes_off(*group, channel));
            }
        }
    }
}

/// Replays from the start, skipping notes and time until the target position, while
/// letting other channel messages through so controllers and programs are current.
/// A timestamp that crosses the target is skipped whole and playback resumes from its
/// end, so events at that time play as soon as the seek finishes.
pub struct TimeSeekProcessor {
    target: u64,
    current: u64,
}

impl TimeSeekProcessor {
    pub fn new(target: u64) -> TimeSeekProcessor {
        TimeSeekProcessor { target, current: 0 }
    }
}

impl SeekProcessor<Ump> for TimeSeekProcessor {
    fn filter_message(&mut self, ump: &Ump) -> SeekFilterResult {
        if self.current >= self.target {
            return SeekFilterResult::PassAndTerminate;
        }
        if ump.is_jr_timestamp() {
            self.current += u64::from(ump.jr_timestamp_value());
            return SeekFilterResult::Block;
        }
        if is_note(ump) {
            SeekFilterResult::Block
        } else {
            SeekFilterResult::Pass
        }
    }

    fn resume_position(&self) -> Option<u64> {
        Some(self.current.max(self.target))
    }
}

/// Plays UMP music through an output.
pub struct Midi2Player {
    looper: EventLooper<UmpSequence>,
    output: Arc<Mutex<dyn Output>>,
    /// Only an output handed over by value is closed with the player.
    owns_output: bool,
    output_closed: AtomicBool,
    total_play_time: u64,
    span: Span,
}

impl Midi2Player {
    /// Creates a player that owns the given output and closes it on close.
    pub fn new<O: Output + 'static>(music: &Music, output: O, timer: Arc<dyn Timer>) -> Midi2Player {
        Midi2Player::build(music, Arc::new(Mutex::new(output)), true, timer)
    }

    /// Creates a player on an output that someone else owns. Closing the player leaves
    /// the output open.
    pub fn with_external_output(
        music: &Music,
        output: Arc<Mutex<dyn Output>>,
        timer: Arc<dyn Timer>,
    ) -> Midi2Player {
        Midi2Player::build(music, output, false, timer)
    }

    /// Creates a player that owns the given output, set up from the configuration.
    pub fn with_config<O: Output + 'static>(
        music: &Music,
        output: O,
        config: &PlayerConfig,
    ) -> Result<Midi2Player, ConfigError> {
        let player = Midi2Player::new(music, output, Arc::new(config.timer()?));
        player.set_tempo(config.tempo()?);
        player.set_tempo_change_ratio(config.tempo_change_ratio()?);
        player.set_muted_channels(config.muted_channels());
        Ok(player)
    }

    fn build(
        music: &Music,
        output: Arc<Mutex<dyn Output>>,
        owns_output: bool,
        timer: Arc<dyn Timer>,
    ) -> Midi2Player {
        let merged;
        let merged_music = if music.format() == FORMAT_MERGED {
            music
        } else {
            merged = merge(music);
            &merged
        };
        let total_play_time = music.total_play_time_milliseconds();
        let messages = merged_music
            .tracks()
            .first()
            .map(|track| track.messages().to_vec())
            .unwrap_or_default();

        let span = span!(Level::INFO, "midi2 player");
        {
            let _enter = span.enter();
            info!(
                output = %output.lock(),
                messages = messages.len(),
                duration = position_display(total_play_time),
                "Created player."
            );
        }

        Midi2Player {
            looper: EventLooper::new(UmpSequence::new(messages, output.clone()), timer),
            output,
            owns_output,
            output_closed: AtomicBool::new(false),
            total_play_time,
            span,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.looper.state()
    }

    /// Starts playback from the beginning, or resumes it if paused.
    pub fn play(&self) -> Result<(), PlayerError> {
        self.looper.play()
    }

    pub fn pause(&self) {
        self.looper.pause();
    }

    pub fn stop(&self) {
        self.looper.stop();
    }

    /// Moves playback to the given position in milliseconds.
    pub fn seek(&self, ticks: u64) {
        let _enter = self.span.enter();
        info!(position = position_display(ticks), "Seeking player.");
        self.looper.seek(Box::new(TimeSeekProcessor::new(ticks)), ticks);
    }

    /// Stops playback, waits for the loop to exit and closes the output if this player owns it.
    pub fn close(&self) -> Result<(), PlayerError> {
        self.looper.stop();
        self.looper.close()?;

        if !self.owns_output || self.output_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let _enter = self.span.enter();
        let mut output = self.output.lock();
        info!(output = %output, "Closing output.");
        output.close().map_err(|source| PlayerError::OutputClose {
            name: output.to_string(),
            source,
        })
    }

    /// Microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.looper.context().tempo()
    }

    pub fn set_tempo(&self, tempo: u32) {
        self.looper.context().set_tempo(tempo);
    }

    pub fn bpm(&self) -> u32 {
        (60.0 / f64::from(self.tempo()) * 1_000_000.0) as u32
    }

    /// The playback speed multiplier.
    pub fn tempo_change_ratio(&self) -> f64 {
        self.looper.context().tempo_ratio()
    }

    /// Changes the playback speed. The stored tempo is left alone.
    pub fn set_tempo_change_ratio(&self, ratio: f64) {
        self.looper.context().set_tempo_ratio(ratio);
    }

    pub fn time_signature(&self) -> [u8; 4] {
        self.looper.context().time_signature()
    }

    pub fn play_delta_time(&self) -> u64 {
        self.looper.context().play_delta_time()
    }

    pub fn position_in_milliseconds(&self) -> u64 {
        self.play_delta_time()
    }

    /// The current position as a duration.
    pub fn position(&self) -> Duration {
        Duration::from_millis(self.position_in_milliseconds())
    }

    pub fn total_play_time_milliseconds(&self) -> u64 {
        self.total_play_time
    }

    /// Stops delivery of channel messages for the given group and channel keys.
    pub fn set_muted_channels<I: IntoIterator<Item = u8>>(&self, muted_channels: I) {
        self.looper.sequence().lock().muted_channels = muted_channels.into_iter().collect();
    }

    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.looper.subscribe()
    }
}

impl Drop for Midi2Player {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(err = %e, "Error closing player.");
        }
    }
}
