//! Error types for tour search.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for search operations.
///
/// Device-layer failures (`Platform`, `Compile`, `Dispatch`, `Allocation`)
/// are always returned as values; the accelerator path never terminates the
/// process.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A problem or kernel file could not be read.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No compute platform or device was found.
    #[error("Platform error: {0}")]
    Platform(String),

    /// The kernel program failed to build.
    #[error("Compile error: {0}")]
    Compile(String),

    /// Enqueueing or executing the kernel failed.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// A device buffer could not be created or written.
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Coordinates or order rejected before evaluation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Search configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed problem file.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl SearchError {
    /// Returns `true` for failures that originate in the device layer or in
    /// loading the kernel program.
    ///
    /// These are the failures after which a caller may retry the same input
    /// on the sequential backend. Bad input or configuration would fail
    /// there too, so they are excluded.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            SearchError::Io { .. }
                | SearchError::Platform(_)
                | SearchError::Compile(_)
                | SearchError::Dispatch(_)
                | SearchError::Allocation(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
