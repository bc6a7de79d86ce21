//! # Error Types
//!
//! Failures the engine can report to its caller. Only two situations are
//! errors here: claiming the audio input and reading/writing configuration.
//! A tick without a detectable pitch is not an error and is modelled as
//! `None` throughout the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons an audio input could not be acquired for a listening session.
///
/// These are terminal for the session that requested them and are never
/// retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("No microphone found. Please connect a microphone.")]
    DeviceUnavailable,

    #[error("Microphone permission denied. Please allow microphone access.")]
    PermissionDenied,

    #[error("Microphone is being used by another application.")]
    AlreadyInUse,

    #[error("The microphone does not offer a usable input format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to access microphone: {0}")]
    Backend(String),
}

/// Errors raised while loading, saving or validating a [`crate::config::TunerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown tuning preset: {0}")]
    UnknownPreset(String),

    #[error("String {string} is not part of tuning preset {preset}")]
    UnknownString { preset: String, string: u8 },

    #[error("Invalid analyzer setting: {0}")]
    InvalidSetting(String),
}
