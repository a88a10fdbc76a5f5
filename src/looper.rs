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

//! A real-time scheduler that walks an event sequence on a background thread, waiting
//! between events and delivering each one.
//!
//! The loop thread and the controlling thread share an atomic [PlayerState] and talk
//! through a single command channel. The loop drains the channel at every iteration
//! boundary and blocks on it while idle or paused. A long timed wait is never
//! interrupted; commands sent during it take effect once it returns.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level, Span};

use crate::{error::PlayerError, music::DEFAULT_TEMPO};

pub mod timer;

pub use timer::{SpinSleepTimer, Timer};

/// The transport state of a looper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

impl PlayerState {
    fn to_u8(self) -> u8 {
        match self {
            PlayerState::Stopped => 0,
            PlayerState::Playing => 1,
            PlayerState::Paused => 2,
        }
    }

    fn from_u8(value: u8) -> PlayerState {
        match value {
            1 => PlayerState::Playing,
            2 => PlayerState::Paused,
            _ => PlayerState::Stopped,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Stopped => "stopped",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// What a seek processor wants done with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekFilterResult {
    /// Deliver the message with normal timing.
    Pass,
    /// Skip the message without waiting.
    Block,
    /// Deliver the message, then stop filtering.
    PassAndTerminate,
    /// Skip the message, then stop filtering.
    BlockAndTerminate,
}

impl SeekFilterResult {
    fn terminates(self) -> bool {
        matches!(
            self,
            SeekFilterResult::PassAndTerminate | SeekFilterResult::BlockAndTerminate
        )
    }

    fn blocks(self) -> bool {
        matches!(
            self,
            SeekFilterResult::Block | SeekFilterResult::BlockAndTerminate
        )
    }
}

/// Filters messages after a seek until it decides the target has been reached.
pub trait SeekProcessor<M>: Send {
    fn filter_message(&mut self, message: &M) -> SeekFilterResult;

    /// The position playback actually resumes from, read once filtering terminates.
    /// None keeps the position given to the seek.
    fn resume_position(&self) -> Option<u64> {
        None
    }
}

impl<M, F> SeekProcessor<M> for F
where
    F: FnMut(&M) -> SeekFilterResult + Send,
{
    fn filter_message(&mut self, message: &M) -> SeekFilterResult {
        self(message)
    }
}

/// The message sequence and the hooks the looper needs to play it.
pub trait EventSequence: Send + 'static {
    type Message: Send + 'static;

    /// True once the index has moved past the last message.
    fn is_at_end(&self, index: usize) -> bool;

    /// The message at the index. Only called when `is_at_end` is false.
    fn message_at(&self, index: usize) -> Self::Message;

    /// How long to wait before delivering the message.
    fn delta_seconds(&self, message: &Self::Message, context: &PlaybackContext) -> f64;

    /// How far the message moves the play position.
    fn duration_of(&self, message: &Self::Message) -> u64;

    /// Refreshes tempo and time signature if the message carries them.
    fn update_tempo_and_time_signature(&self, message: &Self::Message, context: &PlaybackContext);

    /// Delivers the message.
    fn on_event(&mut self, message: Self::Message);

    /// Silences anything that is currently sounding.
    fn mute(&mut self);
}

/// Notifications published by the event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Starting,
    /// Published before `Finished` when the loop ran out of messages.
    CompletedToEnd,
    Finished,
}

/// Tempo, time signature and position shared between the loop and its controller.
#[derive(Debug)]
pub struct PlaybackContext {
    tempo: AtomicU32,
    tempo_ratio: AtomicU64,
    time_signature: Mutex<[u8; 4]>,
    play_delta_time: AtomicU64,
}

impl Default for PlaybackContext {
    fn default() -> Self {
        PlaybackContext {
            tempo: AtomicU32::new(DEFAULT_TEMPO),
            tempo_ratio: AtomicU64::new(1.0f64.to_bits()),
            time_signature: Mutex::new([4, 2, 24, 8]),
            play_delta_time: AtomicU64::new(0),
        }
    }
}

impl PlaybackContext {
    /// Microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.tempo.load(Ordering::Relaxed)
    }

    pub fn set_tempo(&self, tempo: u32) {
        self.tempo.store(tempo, Ordering::Relaxed);
    }

    /// The playback speed multiplier. 2.0 plays twice as fast.
    pub fn tempo_ratio(&self) -> f64 {
        f64::from_bits(self.tempo_ratio.load(Ordering::Relaxed))
    }

    pub fn set_tempo_ratio(&self, ratio: f64) {
        self.tempo_ratio.store(ratio.to_bits(), Ordering::Relaxed);
    }

    pub fn time_signature(&self) -> [u8; 4] {
        *self.time_signature.lock()
    }

    pub fn set_time_signature(&self, time_signature: [u8; 4]) {
        *self.time_signature.lock() = time_signature;
    }

    /// The accumulated duration of every waited message since the run started or the last seek.
    pub fn play_delta_time(&self) -> u64 {
        self.play_delta_time.load(Ordering::Relaxed)
    }

    fn set_play_delta_time(&self, play_delta_time: u64) {
        self.play_delta_time.store(play_delta_time, Ordering::Relaxed);
    }

    fn add_play_delta_time(&self, duration: u64) {
        self.play_delta_time.fetch_add(duration, Ordering::Relaxed);
    }
}

/// Commands sent from the controller to the loop thread.
enum Command<M> {
    Play,
    Pause,
    Stop,
    Seek {
        processor: Box<dyn SeekProcessor<M>>,
        position: u64,
    },
}

/// A seek requested while no loop was running, applied when the next run starts.
struct PendingSeek<M> {
    processor: Box<dyn SeekProcessor<M>>,
    position: u64,
}

/// Handles to a running loop thread.
struct LoopRun<M> {
    commands: Sender<Command<M>>,
    join: JoinHandle<()>,
}

type Subscribers = Arc<Mutex<Vec<Sender<PlaybackEvent>>>>;

/// Drives an [EventSequence] on a background thread.
pub struct EventLooper<S: EventSequence> {
    sequence: Arc<Mutex<S>>,
    timer: Arc<dyn Timer>,
    context: Arc<PlaybackContext>,
    state: Arc<AtomicU8>,
    run: Mutex<Option<LoopRun<S::Message>>>,
    pending_seek: Mutex<Option<PendingSeek<S::Message>>>,
    subscribers: Subscribers,
    span: Span,
}

impl<S: EventSequence> EventLooper<S> {
    /// Creates a stopped looper. No thread is started until the first play.
    pub fn new(sequence: S, timer: Arc<dyn Timer>) -> EventLooper<S> {
        EventLooper {
            sequence: Arc::new(Mutex::new(sequence)),
            timer,
            context: Arc::new(PlaybackContext::default()),
            state: Arc::new(AtomicU8::new(PlayerState::Stopped.to_u8())),
            run: Mutex::new(None),
            pending_seek: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            span: span!(Level::INFO, "event looper"),
        }
    }

    pub fn state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn context(&self) -> &PlaybackContext {
        &self.context
    }

    pub fn sequence(&self) -> &Arc<Mutex<S>> {
        &self.sequence
    }

    /// Returns a receiver for the loop's notifications.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Starts or resumes playback. Starting a new run blocks until the loop thread is up.
    pub fn play(&self) -> Result<(), PlayerError> {
        let _enter = self.span.enter();

        let mut run = self.run.lock();
        match self.state() {
            PlayerState::Playing => {
                debug!("Already playing.");
                return Ok(());
            }
            PlayerState::Paused => {
                if self.transition(PlayerState::Paused, PlayerState::Playing) {
                    info!("Resuming playback.");
                    Self::send(run.as_ref(), Command::Play);
                    return Ok(());
                }
                // The run finished while paused, so start a new one.
            }
            PlayerState::Stopped => {}
        }

        if let Some(previous) = run.take() {
            Self::join(previous)?;
        }

        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let pending_seek = self.pending_seek.lock().take();
        let runner = Runner {
            sequence: self.sequence.clone(),
            timer: self.timer.clone(),
            context: self.context.clone(),
            state: self.state.clone(),
            subscribers: self.subscribers.clone(),
            commands: commands_rx,
            index: 0,
            seek: None,
            waiting: true,
            stop_requested: false,
        };

        let join = thread::Builder::new()
            .name("event-looper".to_string())
            .spawn(move || runner.run(started_tx, pending_seek))?;

        if started_rx.recv().is_err() {
            // The thread dropped the sender without starting, so it has already died.
            let _ = join.join();
            return Err(PlayerError::LoopStart);
        }

        info!("Starting playback.");
        self.state
            .store(PlayerState::Playing.to_u8(), Ordering::Release);
        let run = run.insert(LoopRun {
            commands: commands_tx,
            join,
        });
        Self::send(Some(&*run), Command::Play);
        Ok(())
    }

    /// Pauses playback. Sound is muted right away; the loop parks at its next check.
    pub fn pause(&self) {
        let _enter = self.span.enter();

        let run = self.run.lock();
        if !self.transition(PlayerState::Playing, PlayerState::Paused) {
            debug!(state = %self.state(), "Not playing, nothing to pause.");
            return;
        }

        info!(position = self.context.play_delta_time(), "Pausing playback.");
        self.sequence.lock().mute();
        Self::send(run.as_ref(), Command::Pause);
    }

    /// Stops playback. The loop exits at its next check.
    pub fn stop(&self) {
        let _enter = self.span.enter();

        let run = self.run.lock();
        let stopped = self.transition(PlayerState::Playing, PlayerState::Stopped)
            || self.transition(PlayerState::Paused, PlayerState::Stopped);
        if !stopped {
            debug!("Not playing, nothing to stop.");
            return;
        }

        info!("Stopping playback.");
        Self::send(run.as_ref(), Command::Stop);
    }

    /// Moves playback back to the start of the sequence and lets the processor filter
    /// messages until the target is reached. Playback state is unchanged.
    pub fn seek(&self, processor: Box<dyn SeekProcessor<S::Message>>, position: u64) {
        let _enter = self.span.enter();

        let run = self.run.lock();
        info!(position, "Seeking.");
        self.context.set_play_delta_time(position);
        match run.as_ref() {
            Some(run) if self.state() != PlayerState::Stopped => {
                Self::send(Some(run), Command::Seek { processor, position });
            }
            _ => {
                *self.pending_seek.lock() = Some(PendingSeek {
                    processor,
                    position,
                });
            }
        }
        self.sequence.lock().mute();
    }

    /// Stops playback and waits for the loop thread to exit.
    pub fn close(&self) -> Result<(), PlayerError> {
        self.stop();

        let _enter = self.span.enter();
        let run = self.run.lock().take();
        if let Some(run) = run {
            Self::join(run)?;
        }
        debug!("Event looper closed.");
        Ok(())
    }

    /// Atomically moves from one state to another, returning false if the state was different.
    fn transition(&self, from: PlayerState, to: PlayerState) -> bool {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn send(run: Option<&LoopRun<S::Message>>, command: Command<S::Message>) {
        if let Some(run) = run {
            // A disconnected channel means the loop has already exited.
            if run.commands.send(command).is_err() {
                debug!("Event loop has already exited.");
            }
        }
    }

    fn join(run: LoopRun<S::Message>) -> Result<(), PlayerError> {
        drop(run.commands);
        run.join.join().map_err(|_| PlayerError::LoopPanicked)
    }
}

impl<S: EventSequence> Drop for EventLooper<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(err = %e, "Error closing event looper.");
        }
    }
}

/// The state owned by the loop thread for the length of a run.
struct Runner<S: EventSequence> {
    sequence: Arc<Mutex<S>>,
    timer: Arc<dyn Timer>,
    context: Arc<PlaybackContext>,
    state: Arc<AtomicU8>,
    subscribers: Subscribers,
    commands: Receiver<Command<S::Message>>,
    index: usize,
    seek: Option<Box<dyn SeekProcessor<S::Message>>>,
    waiting: bool,
    stop_requested: bool,
}

impl<S: EventSequence> Runner<S> {
    fn run(mut self, started: Sender<()>, pending_seek: Option<PendingSeek<S::Message>>) {
        let span = span!(Level::INFO, "event loop");
        let _enter = span.enter();

        self.publish(PlaybackEvent::Starting);
        self.context.set_play_delta_time(0);
        if let Some(pending_seek) = pending_seek {
            self.seek = Some(pending_seek.processor);
            self.context.set_play_delta_time(pending_seek.position);
        }
        // The controller holds its lock until this arrives, so it can't fail.
        let _ = started.send(());

        let completed = self.run_events();

        self.state
            .store(PlayerState::Stopped.to_u8(), Ordering::Release);
        self.sequence.lock().mute();

        info!(
            completed,
            position = self.context.play_delta_time(),
            "Event loop finished."
        );
        if completed {
            self.publish(PlaybackEvent::CompletedToEnd);
        }
        self.publish(PlaybackEvent::Finished);
    }

    /// Runs until stopped or out of messages. Returns true if the sequence was exhausted.
    fn run_events(&mut self) -> bool {
        loop {
            if self.waiting {
                match self.commands.recv() {
                    Ok(command) => self.handle(command),
                    Err(_) => return false,
                }
            }
            while let Ok(command) = self.commands.try_recv() {
                self.handle(command);
            }

            if self.stop_requested {
                return false;
            }
            if self.waiting {
                continue;
            }

            let message = {
                let sequence = self.sequence.lock();
                if sequence.is_at_end(self.index) {
                    return true;
                }
                sequence.message_at(self.index)
            };
            self.process_message(message);
            self.index += 1;
        }
    }

    fn handle(&mut self, command: Command<S::Message>) {
        match command {
            Command::Play => self.waiting = false,
            Command::Pause => {
                self.waiting = true;
                self.sequence.lock().mute();
            }
            Command::Stop => self.stop_requested = true,
            Command::Seek {
                processor,
                position,
            } => {
                self.index = 0;
                self.seek = Some(processor);
                self.context.set_play_delta_time(position);
                self.sequence.lock().mute();
            }
        }
    }

    fn process_message(&mut self, message: S::Message) {
        if let Some(seek) = self.seek.as_mut() {
            let result = seek.filter_message(&message);
            if result.terminates() {
                if let Some(position) = seek.resume_position() {
                    self.context.set_play_delta_time(position);
                }
                debug!(
                    index = self.index,
                    ?result,
                    position = self.context.play_delta_time(),
                    "Seek finished."
                );
                self.seek = None;
            }
            if result.blocks() {
                return;
            }
        }

        let seconds = self
            .sequence
            .lock()
            .delta_seconds(&message, &self.context);
        if seconds > 0.0 {
            self.timer.wait_seconds(seconds);
            let duration = self.sequence.lock().duration_of(&message);
            self.context.add_play_delta_time(duration);
        }

        let mut sequence = self.sequence.lock();
        sequence.update_tempo_and_time_signature(&message, &self.context);
        sequence.on_event(message);
    }

    fn publish(&self, event: PlaybackEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }
}
