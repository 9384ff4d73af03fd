//! Loudness Equalizer Server Library
//!
//! HTTP front end for batch loudness equalization: uploads are equalized,
//! packaged into a per-job archive and offered for download.
//!
//! This library exposes the core components for testing purposes.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use services::{JobId, JobStore};
pub use state::AppState;
