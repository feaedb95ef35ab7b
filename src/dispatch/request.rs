//! Request types for a session worker.

use crate::engine::HeartMetrics;
use crate::error::StreamError;
use tokio::sync::oneshot;

/// Tasks queued to a session worker. Every variant carries the one-shot
/// channel its result is delivered on.
pub enum SessionRequest {
    Push {
        samples: Vec<f64>,
        origin_timestamp: f64,
        resp: oneshot::Sender<Result<(), StreamError>>,
    },
    PushTimestamped {
        samples: Vec<f64>,
        timestamps: Vec<f64>,
        resp: oneshot::Sender<Result<(), StreamError>>,
    },
    Poll {
        resp: oneshot::Sender<Result<Option<HeartMetrics>, StreamError>>,
    },
    /// Drop the analyzer and stop the worker.
    Close { resp: oneshot::Sender<()> },
}

impl SessionRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionRequest::Push { .. } => "push",
            SessionRequest::PushTimestamped { .. } => "push_timestamped",
            SessionRequest::Poll { .. } => "poll",
            SessionRequest::Close { .. } => "close",
        }
    }

    /// Reply to a task that will never run.
    pub fn cancel(self) {
        match self {
            SessionRequest::Push { resp, .. } | SessionRequest::PushTimestamped { resp, .. } => {
                let _ = resp.send(Err(StreamError::InvalidHandle));
            }
            SessionRequest::Poll { resp } => {
                let _ = resp.send(Err(StreamError::InvalidPollHandle));
            }
            SessionRequest::Close { resp } => {
                let _ = resp.send(());
            }
        }
    }
}
