//! Audio engine capability consumed by the playback controller.
//!
//! The engine is provided by the platform. The controller only needs to
//! acquire a [`Sound`] bound to a track's URI and drive it through the small
//! command surface below.

use std::{fmt, sync::Arc};

use {
    async_channel::Receiver,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Commands a [`Sound`] or [`AudioEngine`] can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Acquire a sound for a URI.
    Acquire,
    /// Start or resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Stop playback and rewind.
    Stop,
    /// Move the playback position.
    Seek,
    /// Change the output volume.
    SetVolume,
    /// Change the playback rate.
    SetRate,
    /// Toggle single-track looping.
    SetLooping,
    /// Query playback status.
    Status,
    /// Release the sound.
    Release,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquire => "acquire",
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Seek => "seek",
            Self::SetVolume => "set volume",
            Self::SetRate => "set rate",
            Self::SetLooping => "set looping",
            Self::Status => "status",
            Self::Release => "release",
        };
        f.write_str(name)
    }
}

/// Error type for audio engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// The engine could not create a sound for the URI.
    #[error("Failed to load {uri}: {reason}")]
    Acquire { uri: String, reason: String },
    /// A command on a loaded sound failed.
    #[error("Audio engine {command} failed: {reason}")]
    Command {
        command: EngineCommand,
        reason: String,
    },
    /// The sound was already released.
    #[error("Sound has been released")]
    Released,
    /// Track not found or not loaded.
    #[error("No track loaded")]
    NoSoundLoaded,
}

impl AudioError {
    /// Creates a new `Command` error.
    pub fn command(command: EngineCommand, reason: impl Into<String>) -> Self {
        Self::Command {
            command,
            reason: reason.into(),
        }
    }
}

/// Initial parameters applied when a sound is acquired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundConfig {
    /// Output volume in `0.0..=1.0`.
    pub volume: f32,
    /// Playback rate (1.0 = normal speed).
    pub rate: f32,
    /// Keep pitch constant when the rate changes.
    pub correct_pitch: bool,
    /// Loop the track at the engine level.
    pub looping: bool,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            correct_pitch: true,
            looping: false,
        }
    }
}

/// Status reported by a loaded sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SoundStatus {
    /// Elapsed time in milliseconds.
    pub position_ms: u64,
    /// Total time in milliseconds (0 while unknown).
    pub duration_ms: u64,
    /// Whether the sound still holds a loaded resource.
    pub is_loaded: bool,
}

/// A loaded audio resource bound to one URI.
///
/// Implementations manage their own concurrency; every method takes `&self`.
#[async_trait]
pub trait Sound: Send + Sync {
    /// Starts or resumes playback.
    async fn play(&self) -> Result<(), AudioError>;

    /// Pauses playback, keeping the position.
    async fn pause(&self) -> Result<(), AudioError>;

    /// Stops playback and rewinds to the start.
    async fn stop(&self) -> Result<(), AudioError>;

    /// Moves the playback position.
    async fn seek(&self, position_ms: u64) -> Result<(), AudioError>;

    /// Sets the output volume.
    async fn set_volume(&self, volume: f32) -> Result<(), AudioError>;

    /// Sets the playback rate.
    async fn set_rate(&self, rate: f32, correct_pitch: bool) -> Result<(), AudioError>;

    /// Enables or disables looping of this sound.
    async fn set_looping(&self, looping: bool) -> Result<(), AudioError>;

    /// Reports elapsed and total time.
    async fn status(&self) -> Result<SoundStatus, AudioError>;

    /// Frees the underlying resource. Further commands fail.
    async fn release(&self) -> Result<(), AudioError>;

    /// Receiver signalled when playback reaches the end of the sound.
    ///
    /// Engines without a completion event return `None`; the controller then
    /// relies on status polling alone.
    fn completion(&self) -> Option<Receiver<()>> {
        None
    }
}

/// Platform audio engine that hands out [`Sound`]s.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Acquires a sound bound to `uri`, applying `config` before returning.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Acquire` if the URI cannot be opened or decoded.
    async fn acquire(&self, uri: &str, config: SoundConfig) -> Result<Arc<dyn Sound>, AudioError>;
}
