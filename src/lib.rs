//! Playdeck - Playback and queue core for music players
//!
//! A UI-agnostic playback controller: it owns the play queue, drives a
//! platform audio engine through a small capability trait, tracks position,
//! handles track end, shuffle, repeat and a sleep timer, and publishes a
//! complete state snapshot to observers after every change.

pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod state;

// Re-export key types for convenience
pub use {
    audio::{AudioEngine, AudioError, PlaybackController, PlaybackQueue, Sound, VirtualEngine},
    config::{PlayerSettings, SettingsManager},
    error::{PlayerError, Result},
    library::Track,
    state::{PlaybackState, PlayerState, RepeatMode, Subscription},
};
