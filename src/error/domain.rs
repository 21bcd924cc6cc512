//! Domain-specific error types using `thiserror`.
//!
//! `PlayerError` is what every playback controller operation returns. It
//! wraps the engine and settings errors and adds the failures that only the
//! controller can detect.

use std::result::Result as StdResult;

use thiserror::Error;

use crate::{audio::engine::AudioError, config::SettingsError};

/// Playback controller errors.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The audio engine rejected a command or failed to load a track.
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
    /// A setting value was rejected or could not be stored.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    /// A newer load started before this one finished; its sound was discarded.
    #[error("Load of track {track_id} was superseded by a newer load")]
    LoadSuperseded { track_id: String },
    /// A background task was requested outside a tokio runtime.
    #[error("No tokio runtime available for background task")]
    NoRuntime,
}

impl PlayerError {
    /// Creates a `Settings` error for a rejected value.
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::Settings(SettingsError::InvalidValue {
            reason: reason.into(),
        })
    }
}

/// Result type of playback controller operations.
pub type Result<T> = StdResult<T, PlayerError>;
