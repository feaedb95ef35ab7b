//! Session manager: handle registry and the caller-facing operations.

use super::handle_allocator::HandleAllocator;
use super::types::{Handle, Session, SessionInfo, SessionStatus};
use crate::dispatch::{CounterSnapshot, Counters, Dispatcher};
use crate::engine::{Engine, HeartMetrics};
use crate::error::StreamError;
use crate::ingest::SampleBuffer;
use crate::options::{AnalyzerOptions, ManagerConfig};
use crate::validate::validate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Manager for concurrent analyzer sessions.
///
/// Every session runs its analyzer on a dedicated worker thread; tasks for
/// one session execute one at a time in submission order while different
/// sessions proceed in parallel. Validation, handle lookup and batch-shape
/// checks happen synchronously before anything is queued.
pub struct SessionManager {
    engine: Arc<dyn Engine>,
    sessions: RwLock<HashMap<Handle, Arc<Session>>>,
    handles: HandleAllocator,
    counters: Arc<Counters>,
    config: ManagerConfig,
    ingest: SampleBuffer,
}

impl SessionManager {
    /// Create a manager with the default configuration.
    pub fn new(engine: impl Engine) -> Self {
        Self::with_config(engine, ManagerConfig::default())
    }

    pub fn with_config(engine: impl Engine, config: ManagerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            sessions: RwLock::new(HashMap::new()),
            handles: HandleAllocator::new(),
            counters: Arc::new(Counters::default()),
            config: config.normalized(),
            ingest: SampleBuffer::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Submitted/completed task counters across all sessions.
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Shared single-sample ingest buffer.
    pub fn ingest(&self) -> &SampleBuffer {
        &self.ingest
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<Handle, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<Handle, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `options`, build an analyzer on a fresh worker and register
    /// the session.
    ///
    /// Nothing is registered on failure: validation errors carry the first
    /// violated rule's code, an engine that yields no instance gives `E004`.
    pub async fn create(&self, options: AnalyzerOptions) -> Result<Handle, StreamError> {
        if let Err(v) = validate(&options) {
            debug!(code = %v.code(), "Rejected analyzer options");
            return Err(StreamError::InvalidOptions(v));
        }
        if let Some(v) = self.engine.validate(&options) {
            debug!(code = %v.code(), "Engine rejected analyzer options");
            return Err(StreamError::InvalidOptions(v));
        }

        let handle = self
            .handles
            .allocate()
            .ok_or_else(|| StreamError::Execution("session handle space exhausted".to_string()))?;

        let dispatcher = match Dispatcher::spawn(
            handle,
            self.engine.clone(),
            &options,
            self.counters.clone(),
            self.config.queue_capacity,
        )
        .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Failed to create session");
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(dispatcher, options));
        info!(
            handle = %handle,
            fs = session.options().fs,
            window_sec = session.options().streaming.window_sec,
            "Session created"
        );
        self.write_sessions().insert(handle, session);
        Ok(handle)
    }

    /// Resolve a handle to its live session.
    pub fn lookup(&self, handle: Handle) -> Result<Arc<Session>, StreamError> {
        self.read_sessions()
            .get(&handle)
            .cloned()
            .ok_or(StreamError::InvalidHandle)
    }

    /// Resolve a raw handle value; zero is always invalid.
    pub fn lookup_raw(&self, raw: u64) -> Result<Arc<Session>, StreamError> {
        let handle = Handle::from_raw(raw).ok_or(StreamError::InvalidHandle)?;
        self.lookup(handle)
    }

    fn check_batch(&self, len: usize) -> Result<(), StreamError> {
        if len == 0 {
            return Err(StreamError::InvalidBuffer("empty sample buffer".to_string()));
        }
        if len > self.config.max_samples_per_push {
            return Err(StreamError::InvalidBuffer(format!(
                "{} samples exceeds the per-push limit of {}",
                len, self.config.max_samples_per_push
            )));
        }
        Ok(())
    }

    /// Feed a batch of samples to the session's analyzer.
    ///
    /// Resolves once the worker has run the task; batches for one handle are
    /// applied in the order they were accepted.
    pub async fn push(
        &self,
        handle: Handle,
        samples: Vec<f64>,
        origin_timestamp: f64,
    ) -> Result<(), StreamError> {
        let session = self.lookup(handle)?;
        self.check_batch(samples.len())?;
        session.dispatcher().push(samples, origin_timestamp).await
    }

    /// Feed samples with per-sample timestamps.
    ///
    /// Both sequences are truncated to the shorter one before the batch-size
    /// check.
    pub async fn push_timestamped(
        &self,
        handle: Handle,
        mut samples: Vec<f64>,
        mut timestamps: Vec<f64>,
    ) -> Result<(), StreamError> {
        let session = self.lookup(handle)?;
        let n = samples.len().min(timestamps.len());
        self.check_batch(n)?;
        samples.truncate(n);
        timestamps.truncate(n);
        session.dispatcher().push_timestamped(samples, timestamps).await
    }

    /// Ask the session's analyzer for a result. `Ok(None)` means nothing is
    /// ready yet.
    pub async fn poll(&self, handle: Handle) -> Result<Option<HeartMetrics>, StreamError> {
        let session = self
            .lookup(handle)
            .map_err(|_| StreamError::InvalidPollHandle)?;
        session.dispatcher().poll().await
    }

    /// Remove the session and release its analyzer.
    ///
    /// The handle stops resolving before this returns its first poll; tasks
    /// still queued are answered with a handle error and the analyzer is
    /// dropped on its worker. Unknown handles are ignored.
    pub async fn destroy(&self, handle: Handle) {
        let removed = self.write_sessions().remove(&handle);
        let Some(session) = removed else {
            debug!(handle = %handle, "Destroy of unknown handle ignored");
            return;
        };

        info!(handle = %handle, "Destroying session");
        if let Err(e) = session.dispatcher().close(self.config.close_timeout).await {
            warn!(handle = %handle, error = %e, "Session worker did not close cleanly");
        }
    }

    /// [`push`](Self::push) addressed by raw handle value.
    pub async fn push_raw(
        &self,
        raw: u64,
        samples: Vec<f64>,
        origin_timestamp: f64,
    ) -> Result<(), StreamError> {
        let handle = Handle::from_raw(raw).ok_or(StreamError::InvalidHandle)?;
        self.push(handle, samples, origin_timestamp).await
    }

    /// [`push_timestamped`](Self::push_timestamped) addressed by raw handle value.
    pub async fn push_timestamped_raw(
        &self,
        raw: u64,
        samples: Vec<f64>,
        timestamps: Vec<f64>,
    ) -> Result<(), StreamError> {
        let handle = Handle::from_raw(raw).ok_or(StreamError::InvalidHandle)?;
        self.push_timestamped(handle, samples, timestamps).await
    }

    /// [`poll`](Self::poll) addressed by raw handle value.
    pub async fn poll_raw(&self, raw: u64) -> Result<Option<HeartMetrics>, StreamError> {
        let handle = Handle::from_raw(raw).ok_or(StreamError::InvalidPollHandle)?;
        self.poll(handle).await
    }

    /// [`destroy`](Self::destroy) addressed by raw handle value; zero is a no-op.
    pub async fn destroy_raw(&self, raw: u64) {
        if let Some(handle) = Handle::from_raw(raw) {
            self.destroy(handle).await;
        }
    }

    pub fn info(&self, handle: Handle) -> Result<SessionInfo, StreamError> {
        Ok(self.lookup(handle)?.info())
    }

    /// All live sessions, ordered by handle.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.read_sessions().values().map(|s| s.info()).collect();
        infos.sort_by_key(|i| i.handle);
        infos
    }

    /// Get session statistics.
    pub fn stats(&self) -> SessionStats {
        let sessions = self.read_sessions();
        SessionStats {
            total_sessions: sessions.len(),
            ready_sessions: sessions
                .values()
                .filter(|s| s.status() == SessionStatus::Ready)
                .count(),
            handles_issued: self.handles.issued_count(),
            counters: self.counters.snapshot(),
        }
    }

    /// Destroy every live session.
    pub async fn shutdown_all(&self) {
        let handles: Vec<Handle> = self.read_sessions().keys().copied().collect();
        info!(sessions = handles.len(), "Shutting down all sessions");
        for handle in handles {
            self.destroy(handle).await;
        }
    }
}

/// Statistics about sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub ready_sessions: usize,
    pub handles_issued: u64,
    pub counters: CounterSnapshot,
}
