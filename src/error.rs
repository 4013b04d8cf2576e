//! Error types for EMRYS
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.
//!
//! The first four variants are the user-visible failure classes of a chat
//! view. Every remote-call failure is converted into one of them at the call
//! site; nothing here is fatal to the process.

use thiserror::Error;

/// Main error type for EMRYS operations
#[derive(Error, Debug)]
pub enum EmrysError {
    /// A conversation, roster, or feed fetch failed
    ///
    /// Surfaced as a full-view error state, never as an empty chat.
    #[error("Load error: {0}")]
    Load(String),

    /// Message dispatch failed
    ///
    /// Surfaced as an in-log error message that the user can retry from.
    #[error("Send error: {0}")]
    Send(String),

    /// An optional environment capability (speech-to-text) is missing
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// User input failed validation and the submission was blocked
    #[error("Validation error: {0}")]
    Validation(String),

    /// No inference credential is stored on this device
    #[error("No inference API key stored; run `emrys auth` to add one")]
    MissingCredential,

    /// Persistence gateway request failed
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Inference gateway request failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmrysError {
    /// Returns true when the error should send the user to the credential prompt
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential)
    }
}

/// Result type alias for EMRYS operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need the failure class downcast to [`EmrysError`].
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`EmrysError`] carried by an `anyhow` error, if any
pub fn classify(err: &anyhow::Error) -> Option<&EmrysError> {
    err.downcast_ref::<EmrysError>()
}
