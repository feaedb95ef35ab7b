//! Session, handle and session info types.

use crate::dispatch::Dispatcher;
use crate::options::AnalyzerOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Opaque identifier of a live session. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Interpret a raw handle value; `None` for zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Handle)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Handle> for u64 {
    fn from(h: Handle) -> u64 {
        h.get()
    }
}

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting tasks.
    Ready,
    /// Destroy has begun; new tasks are refused.
    Closing,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Closing => write!(f, "closing"),
        }
    }
}

/// Information about a session (serializable for reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub handle: Handle,
    /// Sample rate the session was created with.
    pub fs: f64,
    pub window_sec: f64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// A live session: its immutable configuration and the dispatcher feeding
/// its worker.
pub struct Session {
    options: AnalyzerOptions,
    created_at: DateTime<Utc>,
    dispatcher: Dispatcher,
}

impl Session {
    pub(crate) fn new(dispatcher: Dispatcher, options: AnalyzerOptions) -> Self {
        Self {
            options,
            created_at: Utc::now(),
            dispatcher,
        }
    }

    pub fn handle(&self) -> Handle {
        self.dispatcher.handle()
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn status(&self) -> SessionStatus {
        if self.dispatcher.is_stopped() {
            SessionStatus::Closing
        } else {
            SessionStatus::Ready
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            handle: self.handle(),
            fs: self.options.fs,
            window_sec: self.options.streaming.window_sec,
            status: self.status(),
            created_at: self.created_at,
        }
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
