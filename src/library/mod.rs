//! Track records supplied by the music library.
//!
//! The player treats the library as an external source: it receives
//! [`Track`] values and never scans or imports files itself.

pub mod models;

pub use models::Track;
