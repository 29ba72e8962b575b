//! Error types for the whisker collaborator layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the external collaborators (renderer, image output).
#[derive(Debug, Error)]
pub enum EnvError {
    /// The renderer could not produce an image for a viewpoint
    #[error("Render error: {0}")]
    Render(String),

    /// The image could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Filesystem failure while persisting an image
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EnvError {
    /// Creates a render error.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Creates an encode error.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
