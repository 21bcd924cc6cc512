//! Data models for tracks handed to the player.
//!
//! Tracks arrive from the import/library side as opaque records. The player
//! only reads their identity and `uri`, and bumps the usage statistics when a
//! track is loaded.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Represents a playable track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable identifier assigned by the library.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Track artist.
    pub artist: String,
    /// Album title.
    pub album: String,
    /// Duration in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Playable reference passed to the audio engine.
    pub uri: String,
    /// Artwork reference (if available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    /// Genre (if available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Release year (if available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    /// Number of times the track has been loaded for playback.
    #[serde(default)]
    pub play_count: u32,
    /// When the track was last loaded for playback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<SystemTime>,
}

impl Track {
    /// Creates a track with the fields every library source provides.
    ///
    /// # Arguments
    ///
    /// * `id` - Library identifier
    /// * `title` - Display title
    /// * `uri` - Playable reference
    /// * `duration_ms` - Duration in milliseconds
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        uri: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            uri: uri.into(),
            duration_ms,
            ..Self::default()
        }
    }

    /// Records one playback of this track.
    pub fn mark_played(&mut self, at: SystemTime) {
        self.play_count = self.play_count.saturating_add(1);
        self.last_played = Some(at);
    }
}
