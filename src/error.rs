//! Error types for Koutei

use thiserror::Error;

/// Result type alias for Koutei operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Koutei
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credentials, bad config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Request rejected before any provider call
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Chat completion error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Audio device or decode error
    #[error("audio error: {0}")]
    Audio(String),

    /// Malformed data URI
    #[error("data uri error: {0}")]
    DataUri(String),

    /// Microphone access denied
    #[error("permission denied: {0}")]
    Permission(String),

    /// Speech recognition failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Turn request rejected by the server
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
