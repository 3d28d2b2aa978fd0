//! Error types for the upright-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the upright library.
#[derive(Error, Debug)]
pub enum UprightError {
    /// Orientation/confidence engine error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The file could not be decoded as an image.
    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// The file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rotated image could not be encoded or written back.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input path does not exist.
    #[error("input not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Errors raised by an orientation or recognition engine.
///
/// Only [`EngineError::Unavailable`] aborts a run, and only when it happens
/// while constructing the engine. Every other variant is folded into "no
/// evidence" by the orientation stages.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine cannot be reached at all (binary missing, models missing).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// A single engine call exceeded its time limit.
    #[error("engine call timed out after {0}s")]
    Timeout(u64),

    /// A single engine call failed.
    #[error("engine call failed: {0}")]
    Failed(String),

    /// Engine output could not be understood.
    #[error("unexpected engine output: {0}")]
    Parse(String),
}

/// Result type for the upright library.
pub type Result<T> = std::result::Result<T, UprightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_names_file() {
        let err = UprightError::Decode {
            path: PathBuf::from("scans/page-1.png"),
            reason: "truncated".into(),
        };
        assert_eq!(err.to_string(), "failed to decode scans/page-1.png: truncated");
    }

    #[test]
    fn test_engine_errors_convert() {
        let err = UprightError::from(EngineError::Unavailable("no tesseract".into()));
        assert!(matches!(err, UprightError::Engine(EngineError::Unavailable(_))));
        assert_eq!(err.to_string(), "engine error: engine unavailable: no tesseract");
    }
}
