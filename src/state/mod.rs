//! Player state snapshots and the observers that receive them.
//!
//! This module provides the immutable snapshot type handed to the UI layer
//! and the registry used to deliver it after every change.

pub mod observers;
pub mod player_state;

pub use {
    observers::{Listener, ListenerRegistry, Subscription},
    player_state::{
        PlaybackState, PlayerState, RESTART_THRESHOLD_MS, RepeatMode, format_time,
        restarts_current_track,
    },
};
