//! Error type shared by every core service.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("No live session for platform: {0}")]
    SessionNotFound(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Session host error: {message}")]
    Host { message: String },

    #[error("State lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
