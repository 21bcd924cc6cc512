//! Audio playback system.
//!
//! Provides the engine capability traits, a clock-driven virtual engine, the
//! playback queue, the sleep timer and the controller that ties them together.

pub mod engine;
pub mod player;
pub mod queue;
pub mod sleep_timer;
pub mod virtual_engine;

#[cfg(test)]
mod player_tests;

pub use {
    engine::{AudioEngine, AudioError, EngineCommand, Sound, SoundConfig, SoundStatus},
    player::{POSITION_POLL_INTERVAL, PlaybackController, TRACK_END_TOLERANCE_MS},
    queue::PlaybackQueue,
    sleep_timer::SleepTimer,
    virtual_engine::{EngineCall, VirtualEngine},
};
