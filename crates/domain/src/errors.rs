//! Error types used throughout the integration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Formlink
///
/// Structured business errors returned by the remote API are not modeled
/// here: the transport hands those back as [`crate::types::ApiReply::Fault`]
/// replies. The `Api` variant exists for the layers above the transport,
/// where a fault aborts the enclosing step and has to travel the error
/// channel.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FormlinkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Luminate API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Formlink operations
pub type Result<T> = std::result::Result<T, FormlinkError>;
