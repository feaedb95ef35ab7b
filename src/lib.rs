//! Streaming heart-rate analysis sessions.
//!
//! This library manages many concurrent streaming analyzer sessions behind
//! opaque handles. Callers create a session from a validated
//! [`AnalyzerOptions`], push sample batches into it, poll it for
//! [`HeartMetrics`], and destroy it when done.
//!
//! # Architecture
//!
//! The analyzer implementation (an [`Engine`]) is not assumed to be
//! thread-safe. Each session therefore gets:
//!
//! - **A worker thread** that creates, drives and finally drops the session's
//!   [`Analyzer`](engine::Analyzer). Nothing else ever touches it.
//!
//! - **A bounded queue** feeding that worker. Tasks run one at a time in the
//!   order they were accepted; a full queue is reported as `E103`.
//!
//! - **A [`Dispatcher`](dispatch::Dispatcher)** holding the sending side.
//!   Caller-facing operations are `async` and resolve when the worker replies
//!   over a one-shot channel.
//!
//! Sessions are independent, so different handles make progress in parallel.
//! All input validation happens synchronously before anything is queued, and
//! every failure carries a stable [`ErrorCode`].
//!
//! ```no_run
//! use hrv_stream::{AnalyzerOptions, SessionManager, WindowedEngine};
//!
//! # async fn demo() -> Result<(), hrv_stream::StreamError> {
//! let manager = SessionManager::new(WindowedEngine);
//! let handle = manager
//!     .create(AnalyzerOptions::builder(100.0).bandpass(0.5, 5.0, 2).build())
//!     .await?;
//! manager.push(handle, vec![0.0; 512], 0.0).await?;
//! if let Some(metrics) = manager.poll(handle).await? {
//!     println!("{:.1} bpm", metrics.bpm);
//! }
//! manager.destroy(handle).await;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod options;
pub mod session;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::CounterSnapshot;
pub use engine::{Analyzer, Engine, HeartMetrics, QualityInfo, WindowedEngine};
pub use error::{EngineError, ErrorCode, StreamError};
pub use ingest::SampleBuffer;
pub use options::{AnalyzerOptions, ManagerConfig, MAX_SAMPLES_PER_PUSH};
pub use session::{Handle, SessionInfo, SessionManager, SessionStats, SessionStatus};
pub use validate::{validate, Violation};
