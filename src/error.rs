//! Error types for the render pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering or publishing an image
#[derive(Error, Debug)]
pub enum Error {
    /// A width/height parameter was malformed or not positive
    #[error("Invalid {name}. Must be a positive number.")]
    InvalidParameter {
        /// Parameter name as seen by the caller (`width` or `height`)
        name: &'static str,
        /// The raw value that was rejected
        value: String,
    },

    /// A caller-supplied object key that cannot be stored verbatim
    #[error("Invalid filename {value:?}: {reason}")]
    InvalidFilename {
        value: String,
        reason: &'static str,
    },

    /// The request body was missing or empty
    #[error("No HTML content provided")]
    EmptyContent,

    /// No usable browser executable, or the process failed to start
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// The page did not reach network idle within the load window
    #[error("Page did not become idle within {0}ms")]
    RenderTimeout(u64),

    /// The page loaded but measuring, sizing or capturing it failed
    #[error("Rendering failed: {0}")]
    CaptureFailure(String),

    /// The object store rejected or never received the upload
    #[error("Upload failed: {0}")]
    UploadFailure(String),

    /// Invalid service configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The render worker went away without answering
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. } | Error::InvalidFilename { .. } | Error::EmptyContent
        )
    }
}
