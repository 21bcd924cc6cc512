//! Error handling using `thiserror` and `anyhow`.
//!
//! This module provides the domain error returned by the playback controller
//! and operational helpers for context propagation and reporting.

pub mod domain;
pub mod operational;

pub use {
    domain::{PlayerError, Result},
    operational::{ErrorReporter, ResultExt},
};
