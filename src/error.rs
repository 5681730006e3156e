//! Error types for the Cinnabar host/engine bridge

use std::fmt;
use thiserror::Error;

/// An error value as it crosses the script/host boundary.
///
/// Every failure delivered through a promise rejection carries at minimum
/// a `name` (the error kind, e.g. `"FetchError"`, `"AbortError"`,
/// `"TypeError"`) and a human-readable `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Error kind, e.g. `"TypeError"` or `"AbortError"`
    pub name: String,
    /// Human-readable description
    pub message: String,
}

impl ScriptError {
    /// Create an error with an explicit kind
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// A `TypeError` (bad argument shapes, unserializable options)
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// A `ReferenceError` (unknown global or object name)
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new("ReferenceError", message)
    }

    /// The distinguished rejection kind for observed cancellation
    pub fn aborted() -> Self {
        Self::new("AbortError", "The operation was aborted")
    }

    /// A transport failure surfaced to script
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new("FetchError", message)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for ScriptError {}

/// Host-facing errors produced by the bridge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A script promise rejected; the payload has been normalized into a
    /// name/message pair.
    #[error("{0}")]
    Rejected(ScriptError),

    /// The target callable threw synchronously, or returned a value where
    /// a promise was expected. Surfaced immediately, never awaited.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// The engine thread has been torn down; the call can no longer be
    /// delivered or answered.
    #[error("engine thread is gone")]
    EngineGone,

    /// Failure while building the host runtime or engine thread.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// The rejection payload, when this error is a normalized rejection.
    pub fn rejection(&self) -> Option<&ScriptError> {
        match self {
            Self::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::fetch("connection refused");
        assert_eq!(err.to_string(), "FetchError: connection refused");
    }

    #[test]
    fn test_aborted_kind() {
        let err = ScriptError::aborted();
        assert_eq!(err.name, "AbortError");
    }

    #[test]
    fn test_rejection_accessor() {
        let err = CoreError::Rejected(ScriptError::new("Error", "boom"));
        assert_eq!(err.rejection().map(|e| e.message.as_str()), Some("boom"));
        assert!(CoreError::EngineGone.rejection().is_none());
    }
}
