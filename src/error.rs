//! Error types for the session manager.
//!
//! Every caller-visible failure carries a stable [`ErrorCode`]. Configuration
//! and input-shape errors are produced synchronously at the boundary; execution
//! errors come back from the session worker through the task's reply channel.

use crate::validate::Violation;
use serde::Serialize;
use thiserror::Error;

/// Stable, caller-matchable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Sample rate outside [1, 10000] Hz.
    E001,
    /// Engine returned no instance on create.
    E004,
    /// Invalid band-pass bounds.
    E011,
    /// Invalid spectral-window size.
    E012,
    /// Invalid BPM bounds.
    E013,
    /// Invalid refractory period.
    E014,
    /// Handle is zero, unknown, or already destroyed.
    E101,
    /// Sample/timestamp buffer empty or over the per-call cap.
    E102,
    /// Session queue is full.
    E103,
    /// Poll against a zero, unknown, or destroyed handle.
    E111,
    /// Unclassified failure while executing a queued task.
    E900,
    /// Options document could not be read or parsed.
    E902,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E001 => "E001",
            ErrorCode::E004 => "E004",
            ErrorCode::E011 => "E011",
            ErrorCode::E012 => "E012",
            ErrorCode::E013 => "E013",
            ErrorCode::E014 => "E014",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E103 => "E103",
            ErrorCode::E111 => "E111",
            ErrorCode::E900 => "E900",
            ErrorCode::E902 => "E902",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by [`SessionManager`](crate::SessionManager) operations.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid options: {0}")]
    InvalidOptions(Violation),

    #[error("Engine failed to create an analyzer instance")]
    EngineCreate,

    #[error("Invalid or destroyed handle")]
    InvalidHandle,

    #[error("Invalid or destroyed handle (poll)")]
    InvalidPollHandle,

    #[error("Invalid data buffer: {0}")]
    InvalidBuffer(String),

    #[error("Session queue is full")]
    Busy,

    #[error("Task failed: {0}")]
    Execution(String),

    #[error("Failed to load options: {0}")]
    Options(String),
}

impl StreamError {
    /// The stable code callers match on.
    pub fn code(&self) -> ErrorCode {
        match self {
            StreamError::InvalidOptions(v) => v.code(),
            StreamError::EngineCreate => ErrorCode::E004,
            StreamError::InvalidHandle => ErrorCode::E101,
            StreamError::InvalidPollHandle => ErrorCode::E111,
            StreamError::InvalidBuffer(_) => ErrorCode::E102,
            StreamError::Busy => ErrorCode::E103,
            StreamError::Execution(_) => ErrorCode::E900,
            StreamError::Options(_) => ErrorCode::E902,
        }
    }
}

impl From<EngineError> for StreamError {
    fn from(e: EngineError) -> Self {
        StreamError::Execution(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for StreamError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        StreamError::InvalidHandle
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Options(e.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Options(e.to_string())
    }
}

/// Failures reported by an [`Analyzer`](crate::engine::Analyzer) while running a task.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analyzer rejected input: {0}")]
    Rejected(String),

    #[error("analyzer panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use crate::error::{EngineError, ErrorCode, StreamError};
    use crate::validate::Violation;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(StreamError::InvalidHandle.code().as_str(), "E101");
        assert_eq!(StreamError::InvalidPollHandle.code().as_str(), "E111");
        assert_eq!(StreamError::EngineCreate.code().as_str(), "E004");
        assert_eq!(
            StreamError::InvalidBuffer("empty buffer".into()).code(),
            ErrorCode::E102
        );
        assert_eq!(StreamError::Busy.code().to_string(), "E103");
    }

    #[test]
    fn violation_code_passes_through() {
        let err = StreamError::InvalidOptions(Violation::BpmRange);
        assert_eq!(err.code(), ErrorCode::E013);
        assert!(err.to_string().contains("BPM"));
    }

    #[test]
    fn engine_error_is_unclassified() {
        let err: StreamError = EngineError::Other("boom".into()).into();
        assert_eq!(err.code(), ErrorCode::E900);
        assert_eq!(err.to_string(), "Task failed: boom");
    }
}
