//! Error types for specter

use thiserror::Error;

/// Result type for specter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for specter
#[derive(Debug, Error)]
pub enum Error {
    /// Settings document could not be parsed
    #[error("Invalid settings document: {0}")]
    Settings(#[from] serde_json::Error),

    /// Settings document parsed but is structurally unusable
    #[error("Unusable settings in {context}: {message}")]
    SettingsShape { context: String, message: String },

    /// Event could not be handed to the logging sink
    #[error("Sink error: {context}")]
    Sink { context: String },

    /// A realm-level operation failed (embedder misuse, never page-visible)
    #[error("Realm error: {0}")]
    Realm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a sink error with context
    pub fn sink(context: impl Into<String>) -> Self {
        Self::Sink {
            context: context.into(),
        }
    }

    /// Create a settings-shape error with context
    pub fn settings_shape(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SettingsShape {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a realm error
    pub fn realm(message: impl Into<String>) -> Self {
        Self::Realm(message.into())
    }
}
