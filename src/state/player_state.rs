//! Player state snapshot broadcast to observers.
//!
//! `PlayerState` is never stored by the controller; it is rebuilt from the
//! controller's fields on every change and handed out by value.

use serde::{Deserialize, Serialize};

use crate::library::Track;

/// Position past which "previous" restarts the current track instead of
/// moving back in the queue.
pub const RESTART_THRESHOLD_MS: u64 = 3_000;

/// Whether "previous" at `position_ms` should rewind the current track.
#[must_use]
pub fn restarts_current_track(position_ms: u64) -> bool {
    position_ms > RESTART_THRESHOLD_MS
}

/// Repeat behaviour at the end of a track or of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop at the end of the queue.
    #[default]
    Off,
    /// Wrap around to the start of the queue.
    All,
    /// Repeat the current track.
    One,
}

impl RepeatMode {
    /// Next mode in the off → all → one → off cycle.
    #[must_use]
    pub fn cycled(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

/// Coarse playback state derived from the snapshot flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing is playing; the resting state.
    Stopped,
    /// A track is being loaded.
    Loading,
    /// Audio is playing.
    Playing,
    /// Playback is paused.
    Paused,
}

/// Full player snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Track currently loaded (or last loaded).
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub is_paused: bool,
    /// True only while a load is in flight.
    pub is_loading: bool,
    /// Elapsed time in milliseconds.
    #[serde(rename = "position")]
    pub position_ms: u64,
    /// Total time in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Stored volume in `0.0..=1.0`, independent of mute.
    pub volume: f32,
    pub is_muted: bool,
    pub repeat_mode: RepeatMode,
    pub is_shuffle_enabled: bool,
    /// Tracks in queue order.
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub playback_speed: f32,
    pub crossfade_enabled: bool,
    /// Crossfade length in seconds.
    pub crossfade_duration: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            is_paused: false,
            is_loading: false,
            position_ms: 0,
            duration_ms: 0,
            volume: 1.0,
            is_muted: false,
            repeat_mode: RepeatMode::Off,
            is_shuffle_enabled: false,
            queue: Vec::new(),
            current_index: 0,
            playback_speed: 1.0,
            crossfade_enabled: false,
            crossfade_duration: 3,
        }
    }
}

impl PlayerState {
    /// Collapses the flags into a single state.
    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        if self.is_loading {
            PlaybackState::Loading
        } else if self.is_playing {
            PlaybackState::Playing
        } else if self.is_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Stopped
        }
    }

    /// Volume actually applied to the engine.
    #[must_use]
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted { 0.0 } else { self.volume }
    }

    /// Whether a "next" control should be offered.
    #[must_use]
    pub fn has_next(&self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        if self.repeat_mode == RepeatMode::All || self.is_shuffle_enabled {
            return true;
        }
        self.current_index + 1 < self.queue.len()
    }

    /// Whether a "previous" control should be offered.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        if self.repeat_mode == RepeatMode::All || self.is_shuffle_enabled {
            return true;
        }
        self.current_index > 0 || restarts_current_track(self.position_ms)
    }

    /// Elapsed share of the track in percent (0 when the duration is unknown).
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.position_ms as f64 / self.duration_ms as f64) * 100.0
    }

    /// Time left in the track in milliseconds.
    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.position_ms)
    }
}

/// Formats milliseconds as `m:ss`, or `h:mm:ss` from one hour up.
#[must_use]
pub fn format_time(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
