//! Error types for voice-prompt.

use thiserror::Error;

/// Result type alias for voice-prompt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the generation client, speech backends and binaries
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream text generation failed
    #[error("generation error: {0}")]
    Generation(String),

    /// Speech synthesis error
    #[error("speech error: {0}")]
    Speech(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
