// ================================================================
// File: miraibot-common/src/error.rs
// ================================================================

use thiserror::Error;

use crate::models::stream::{ErrorClassification, StreamError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // --- Authentication taxonomy ---
    /// A stored session was rejected by the identity probe.
    #[error("Session validation failed: {0}")]
    ValidationFailure(String),

    /// Wrong account identifier or secret. Never retried.
    #[error("Fatal authentication error: {0}")]
    FatalAuth(String),

    /// The retry budget for full authentication cycles is spent.
    #[error("Authentication retry budget exhausted after {attempts} attempt(s)")]
    AuthExhausted { attempts: u32 },

    /// Nobody answered the two-factor prompt in time.
    #[error("Timed out waiting for a two-factor code")]
    AuthChallengeTimeout,

    // --- Realtime stream taxonomy ---
    #[error("Transient stream error: {0}")]
    StreamTransient(String),

    #[error("Stream challenge raised by platform: {0}")]
    StreamChallenge(String),

    #[error("Stream session invalidated: {0}")]
    StreamSessionInvalid(String),

    #[error("Unclassified stream error: {0}")]
    StreamUnknown(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Errors that must stop the process instead of driving another
    /// authentication cycle.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(
            self,
            Error::FatalAuth(_)
                | Error::AuthExhausted { .. }
                | Error::AuthChallengeTimeout
                | Error::Cancelled
        )
    }
}

impl Error {
    /// Wraps a classified stream error, keeping its raw text for the logs.
    pub fn from_stream(class: ErrorClassification, err: &StreamError) -> Self {
        let raw = err.raw();
        match class {
            ErrorClassification::Transient => Error::StreamTransient(raw),
            ErrorClassification::Challenge => Error::StreamChallenge(raw),
            ErrorClassification::SessionInvalid => Error::StreamSessionInvalid(raw),
            ErrorClassification::Unknown => Error::StreamUnknown(raw),
        }
    }
}
