//! Error types for the load shedder

use core::fmt;
use std::io;

use crate::config::ConfigError;

/// Result type for shedder operations
pub type ShedResult<T> = Result<T, ShedError>;

/// Errors that can occur while resolving limits or sampling CPU time
///
/// None of these are fatal to the host: callers log them and fall back
/// to a zero usage reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShedError {
    /// CPU accounting is not available on this platform
    Unsupported,

    /// Reading a control or counter file failed
    Io {
        path: String,
        kind: io::ErrorKind,
    },

    /// A control or counter file had unexpected content
    Malformed {
        what: &'static str,
        detail: String,
    },

    /// The process is not a member of a cgroup with the given controller
    NoController(&'static str),

    /// Configuration rejected by validation
    Config(ConfigError),

    /// Failed to spawn a background thread
    SpawnFailed(String),

    /// A sampler or sink panicked inside a periodic tick
    Panicked(String),
}

impl ShedError {
    /// Build an `Io` error for the file at `path`
    pub fn io(path: impl AsRef<std::path::Path>, err: &io::Error) -> Self {
        ShedError::Io {
            path: path.as_ref().display().to_string(),
            kind: err.kind(),
        }
    }

    /// Build a `Malformed` error
    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        ShedError::Malformed {
            what,
            detail: detail.into(),
        }
    }

    /// True for errors caused by a missing file or controller, as opposed
    /// to content that was present but unreadable
    pub fn is_missing(&self) -> bool {
        match self {
            ShedError::Io { kind, .. } => *kind == io::ErrorKind::NotFound,
            ShedError::NoController(_) | ShedError::Unsupported => true,
            _ => false,
        }
    }
}

impl fmt::Display for ShedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShedError::Unsupported => write!(f, "cpu accounting unsupported on this platform"),
            ShedError::Io { path, kind } => write!(f, "failed to read {}: {:?}", path, kind),
            ShedError::Malformed { what, detail } => write!(f, "bad format of {}: {}", what, detail),
            ShedError::NoController(name) => write!(f, "no cgroup with controller {}", name),
            ShedError::Config(e) => write!(f, "{}", e),
            ShedError::SpawnFailed(name) => write!(f, "failed to spawn thread {}", name),
            ShedError::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

impl std::error::Error for ShedError {}

impl From<ConfigError> for ShedError {
    fn from(e: ConfigError) -> Self {
        ShedError::Config(e)
    }
}
