//! Persistent player settings.
//!
//! This module provides the settings document that survives restarts and
//! the manager that loads and saves it.

pub mod settings;

pub use settings::{PlayerSettings, SettingsError, SettingsManager, get_config_path};
