//! Persisted player settings with XDG Base Directory compliance.
//!
//! The player keeps one small JSON document with the settings that survive a
//! restart. It is read once when the controller is built and rewritten after
//! every change to one of its fields.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::{Error as StdError, ErrorKind::NotFound},
    path::{Path, PathBuf},
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::{debug, warn},
};

use crate::state::RepeatMode;

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Serializable player settings with default values.
///
/// Mute state is not stored; it resets on every start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSettings {
    /// Stored output volume (0.0-1.0).
    pub volume: f32,
    /// Repeat mode.
    pub repeat_mode: RepeatMode,
    /// Whether shuffle navigation is enabled.
    pub is_shuffle_enabled: bool,
    /// Playback rate (1.0 = normal speed).
    pub playback_speed: f32,
    /// Whether crossfading between tracks is enabled.
    pub crossfade_enabled: bool,
    /// Crossfade length in seconds.
    pub crossfade_duration: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            repeat_mode: RepeatMode::Off,
            is_shuffle_enabled: false,
            playback_speed: 1.0,
            crossfade_enabled: false,
            crossfade_duration: 3,
        }
    }
}

impl PlayerSettings {
    /// Checks that loaded values are usable, replacing any that are not.
    fn sanitized(mut self) -> Self {
        if !self.volume.is_finite() {
            self.volume = 1.0;
        }
        self.volume = self.volume.clamp(0.0, 1.0);
        if !self.playback_speed.is_finite() || self.playback_speed <= 0.0 {
            self.playback_speed = 1.0;
        }
        self
    }
}

/// Handles loading and saving of player settings.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe settings storage.
    settings: RwLock<PlayerSettings>,
    /// Path to the settings file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with the default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the settings file exists but cannot be read.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path (for testing).
    ///
    /// A missing file yields defaults. A file that cannot be parsed is logged
    /// and replaced by defaults on the next save.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the config directory cannot be created or
    /// the file cannot be read.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        if let Some(parent) = config_path.parent() {
            create_dir_all(parent)?;
        }

        let settings = load_settings(&config_path)?;

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Gets the current settings.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, PlayerSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Replaces the settings and saves them to disk.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be saved to disk.
    pub fn update_settings(&self, new_settings: PlayerSettings) -> Result<(), SettingsError> {
        let mut settings_write = self.settings.write();
        if *settings_write == new_settings {
            return Ok(());
        }
        *settings_write = new_settings;
        drop(settings_write);
        self.save_settings()
    }

    /// Saves the current settings to disk.
    fn save_settings(&self) -> Result<(), SettingsError> {
        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<PlayerSettings, SettingsError> {
    let contents = match read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == NotFound => {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(PlayerSettings::default());
        }
        Err(e) => return Err(e.into()),
    };

    match from_str::<PlayerSettings>(&contents) {
        Ok(settings) => {
            debug!("Loaded settings from {:?}", path);
            Ok(settings.sanitized())
        }
        Err(e) => {
            warn!("Ignoring unreadable settings file {:?}: {e}", path);
            Ok(PlayerSettings::default())
        }
    }
}

/// Path of the settings file under the XDG config directory.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = get_xdg_config_home();
    config_dir.push("playdeck");
    config_dir.push("settings.json");
    config_dir
}

/// Gets the XDG config home directory following XDG Base Directory specification.
///
/// Uses `XDG_CONFIG_HOME` environment variable if set, otherwise defaults to $HOME/.config
fn get_xdg_config_home() -> PathBuf {
    if let Ok(config_home) = var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return PathBuf::from(config_home);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(".config");
        return path;
    }

    PathBuf::from(".")
}
