//! Error types for the test runner
//!
//! Error messages are written to be actionable: they name the offending
//! path, variable, or subtree so a failing suite can be fixed from the
//! report alone.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the test runner
#[derive(Error, Debug)]
pub enum Error {
    // === Data store errors ===
    #[error("Attempted to retrieve data from the data store that does not exist: {0}")]
    MissingKey(String),

    #[error("Attempted to index a sequence with a non-integer key: {0}")]
    BadIndex(String),

    #[error("Index reaches past the end of the sequence: {0}")]
    IndexOutOfBounds(String),

    // === Template errors ===
    #[error("Failed to resolve variable: {0}")]
    BadVariable(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    // === Schema errors ===
    #[error("Malformed matcher definition: {0}")]
    MalformedMatcher(String),

    // === Transport errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    // === Configuration errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Wrapped library errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
