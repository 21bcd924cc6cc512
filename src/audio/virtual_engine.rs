//! In-process audio engine driven by the tokio clock.
//!
//! `VirtualEngine` produces no sound. Each sound advances its position from
//! the elapsed wall time scaled by its rate, which is enough to run the
//! player headless and to exercise the controller in tests. Every command is
//! recorded, and individual commands can be made to fail.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
    },
};

use {
    async_trait::async_trait,
    parking_lot::{Mutex, RwLock},
    tokio::time::{Duration, Instant, sleep},
    tracing::debug,
};

use crate::audio::engine::{
    AudioEngine, AudioError, EngineCommand, Sound, SoundConfig, SoundStatus,
};

/// A command observed by the virtual engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// A sound was requested for the URI.
    Acquire(String),
    /// Playback started.
    Play,
    /// Playback paused.
    Pause,
    /// Playback stopped.
    Stop,
    /// Position moved (milliseconds).
    Seek(u64),
    /// Volume changed.
    SetVolume(f32),
    /// Rate changed.
    SetRate(f32),
    /// Looping toggled.
    SetLooping(bool),
    /// Sound released.
    Release,
}

/// State shared between the engine and the sounds it hands out.
#[derive(Debug, Default)]
struct EngineShared {
    calls: Mutex<Vec<EngineCall>>,
    failing: Mutex<HashSet<EngineCommand>>,
    live_sounds: AtomicUsize,
}

impl EngineShared {
    /// Records `call` and fails if `command` has been made to fail.
    fn record(&self, command: EngineCommand, call: Option<EngineCall>) -> Result<(), AudioError> {
        if let Some(call) = call {
            self.calls.lock().push(call);
        }
        if self.failing.lock().contains(&command) {
            return Err(AudioError::command(command, "injected failure"));
        }
        Ok(())
    }
}

/// Clock-driven engine with a catalog of known URIs.
#[derive(Debug, Default)]
pub struct VirtualEngine {
    catalog: RwLock<HashMap<String, u64>>,
    /// Simulated decode time before `acquire` resolves.
    acquire_delay: RwLock<Option<Duration>>,
    shared: Arc<EngineShared>,
}

impl VirtualEngine {
    /// Creates an engine with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URI to the catalog, consuming and returning the engine.
    #[must_use]
    pub fn with_track(self, uri: impl Into<String>, duration_ms: u64) -> Self {
        self.register(uri, duration_ms);
        self
    }

    /// Adds or replaces a URI in the catalog.
    pub fn register(&self, uri: impl Into<String>, duration_ms: u64) {
        self.catalog.write().insert(uri.into(), duration_ms);
    }

    /// Delays every subsequent `acquire` by `delay`.
    pub fn set_acquire_delay(&self, delay: Option<Duration>) {
        *self.acquire_delay.write() = delay;
    }

    /// Makes every subsequent `command` fail until restored.
    pub fn fail_command(&self, command: EngineCommand) {
        self.shared.failing.lock().insert(command);
    }

    /// Undoes [`VirtualEngine::fail_command`].
    pub fn restore_command(&self, command: EngineCommand) {
        self.shared.failing.lock().remove(&command);
    }

    /// Returns every recorded command in order.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.calls.lock().clone()
    }

    /// Counts recorded commands matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.shared.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Forgets all recorded commands.
    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    /// Number of acquired sounds not yet released.
    #[must_use]
    pub fn live_sounds(&self) -> usize {
        self.shared.live_sounds.load(SeqCst)
    }
}

#[async_trait]
impl AudioEngine for VirtualEngine {
    async fn acquire(&self, uri: &str, config: SoundConfig) -> Result<Arc<dyn Sound>, AudioError> {
        self.shared
            .record(EngineCommand::Acquire, Some(EngineCall::Acquire(uri.to_string())))
            .map_err(|e| AudioError::Acquire {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;

        let delay = *self.acquire_delay.read();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let Some(duration_ms) = self.catalog.read().get(uri).copied() else {
            return Err(AudioError::Acquire {
                uri: uri.to_string(),
                reason: "unknown source".to_string(),
            });
        };

        debug!("VirtualEngine: acquired {uri} ({duration_ms} ms)");
        self.shared.live_sounds.fetch_add(1, SeqCst);

        Ok(Arc::new(VirtualSound {
            duration_ms,
            clock: Mutex::new(SoundClock {
                anchor_ms: 0,
                started_at: None,
                rate: config.rate,
                looping: config.looping,
            }),
            released: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Position bookkeeping for one virtual sound.
#[derive(Debug)]
struct SoundClock {
    /// Position at the moment `started_at` was taken (or the frozen position).
    anchor_ms: u64,
    /// Set while playing.
    started_at: Option<Instant>,
    rate: f32,
    looping: bool,
}

impl SoundClock {
    fn position(&self, duration_ms: u64) -> u64 {
        let raw = match self.started_at {
            Some(started_at) => {
                let elapsed = started_at.elapsed().as_secs_f64() * 1000.0 * f64::from(self.rate);
                self.anchor_ms.saturating_add(elapsed as u64)
            }
            None => self.anchor_ms,
        };

        if duration_ms == 0 {
            raw
        } else if self.looping {
            raw % duration_ms
        } else {
            raw.min(duration_ms)
        }
    }

    /// Freezes the current position into the anchor, keeping the play state.
    fn reanchor(&mut self, duration_ms: u64) {
        self.anchor_ms = self.position(duration_ms);
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }
}

/// Sound handed out by [`VirtualEngine`].
#[derive(Debug)]
pub struct VirtualSound {
    duration_ms: u64,
    clock: Mutex<SoundClock>,
    released: AtomicBool,
    shared: Arc<EngineShared>,
}

impl VirtualSound {
    fn ensure_loaded(&self) -> Result<(), AudioError> {
        if self.released.load(SeqCst) {
            Err(AudioError::Released)
        } else {
            Ok(())
        }
    }

    fn command(&self, command: EngineCommand, call: EngineCall) -> Result<(), AudioError> {
        self.shared.record(command, Some(call))?;
        self.ensure_loaded()
    }
}

#[async_trait]
impl Sound for VirtualSound {
    async fn play(&self) -> Result<(), AudioError> {
        self.command(EngineCommand::Play, EngineCall::Play)?;
        let mut clock = self.clock.lock();
        if clock.started_at.is_none() {
            // Finished non-looping sounds restart from the top.
            if self.duration_ms > 0 && clock.anchor_ms >= self.duration_ms {
                clock.anchor_ms = 0;
            }
            clock.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.command(EngineCommand::Pause, EngineCall::Pause)?;
        let mut clock = self.clock.lock();
        clock.anchor_ms = clock.position(self.duration_ms);
        clock.started_at = None;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.command(EngineCommand::Stop, EngineCall::Stop)?;
        let mut clock = self.clock.lock();
        clock.anchor_ms = 0;
        clock.started_at = None;
        Ok(())
    }

    async fn seek(&self, position_ms: u64) -> Result<(), AudioError> {
        self.command(EngineCommand::Seek, EngineCall::Seek(position_ms))?;
        let mut clock = self.clock.lock();
        clock.anchor_ms = position_ms.min(self.duration_ms);
        if clock.started_at.is_some() {
            clock.started_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.command(EngineCommand::SetVolume, EngineCall::SetVolume(volume))
    }

    async fn set_rate(&self, rate: f32, _correct_pitch: bool) -> Result<(), AudioError> {
        self.command(EngineCommand::SetRate, EngineCall::SetRate(rate))?;
        let mut clock = self.clock.lock();
        clock.reanchor(self.duration_ms);
        clock.rate = rate;
        Ok(())
    }

    async fn set_looping(&self, looping: bool) -> Result<(), AudioError> {
        self.command(EngineCommand::SetLooping, EngineCall::SetLooping(looping))?;
        let mut clock = self.clock.lock();
        clock.reanchor(self.duration_ms);
        clock.looping = looping;
        Ok(())
    }

    async fn status(&self) -> Result<SoundStatus, AudioError> {
        self.shared.record(EngineCommand::Status, None)?;
        let is_loaded = !self.released.load(SeqCst);
        Ok(SoundStatus {
            position_ms: self.clock.lock().position(self.duration_ms),
            duration_ms: self.duration_ms,
            is_loaded,
        })
    }

    async fn release(&self) -> Result<(), AudioError> {
        self.shared
            .record(EngineCommand::Release, Some(EngineCall::Release))?;
        if !self.released.swap(true, SeqCst) {
            self.shared.live_sounds.fetch_sub(1, SeqCst);
        }
        Ok(())
    }
}
