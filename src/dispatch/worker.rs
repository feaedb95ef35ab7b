//! Session dispatcher handle for async requests.

use crate::dispatch::counters::Counters;
use crate::dispatch::loop_impl::{catch_panic, run_session_loop};
use crate::dispatch::request::SessionRequest;
use crate::engine::{Engine, HeartMetrics};
use crate::error::StreamError;
use crate::options::AnalyzerOptions;
use crate::session::Handle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Backoff between control enqueue retries (milliseconds).
const CONTROL_SEND_BACKOFF_MS: u64 = 25;

/// Handle for sending tasks to one session's worker thread.
///
/// The worker owns the analyzer for its whole life: it is created, driven
/// and dropped on that thread.
pub struct Dispatcher {
    handle: Handle,
    tx: mpsc::SyncSender<SessionRequest>,
    stopped: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Start a worker thread and build the analyzer on it.
    ///
    /// Fails with [`StreamError::EngineCreate`] when the engine returns no
    /// instance (or panics); the thread has exited by then.
    pub(crate) async fn spawn(
        handle: Handle,
        engine: Arc<dyn Engine>,
        opts: &AnalyzerOptions,
        counters: Arc<Counters>,
        queue_capacity: usize,
    ) -> Result<Self, StreamError> {
        let (tx, rx) = mpsc::sync_channel(queue_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let worker_stopped = stopped.clone();
        let worker_counters = counters.clone();
        let opts = opts.clone();
        thread::Builder::new()
            .name(format!("hrv-session-{handle}"))
            .spawn(move || {
                let analyzer = match catch_panic(|| engine.create(&opts)) {
                    Ok(Some(analyzer)) => analyzer,
                    Ok(None) => {
                        warn!(handle = %handle, "Engine returned no analyzer");
                        let _ = ready_tx.send(false);
                        return;
                    }
                    Err(msg) => {
                        warn!(handle = %handle, error = %msg, "Engine panicked during create");
                        let _ = ready_tx.send(false);
                        return;
                    }
                };
                if ready_tx.send(true).is_err() {
                    debug!(handle = %handle, "Creator went away, discarding analyzer");
                    return;
                }
                run_session_loop(handle, rx, analyzer, worker_stopped, worker_counters);
            })
            .map_err(|e| StreamError::Execution(format!("failed to spawn session worker: {e}")))?;

        match ready_rx.await {
            Ok(true) => Ok(Self {
                handle,
                tx,
                stopped,
                counters,
            }),
            _ => Err(StreamError::EngineCreate),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Refuse further tasks. Returns `false` if the session was already stopped.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    fn try_send(&self, req: SessionRequest) -> Result<(), StreamError> {
        if self.is_stopped() {
            return Err(StreamError::InvalidHandle);
        }
        match self.tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::TrySendError::Full(_)) => Err(StreamError::Busy),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(StreamError::InvalidHandle),
        }
    }

    async fn send_with_retry(
        &self,
        req: SessionRequest,
        max_wait: Duration,
    ) -> Result<(), StreamError> {
        let start = Instant::now();
        let mut pending = req;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(req)) => {
                    if Instant::now().duration_since(start) >= max_wait {
                        return Err(StreamError::Busy);
                    }
                    pending = req;
                    tokio::time::sleep(Duration::from_millis(CONTROL_SEND_BACKOFF_MS)).await;
                }
                Err(mpsc::TrySendError::Disconnected(_)) => return Err(StreamError::InvalidHandle),
            }
        }
    }

    /// Queue samples for the analyzer and wait for it to take them.
    pub async fn push(&self, samples: Vec<f64>, origin_timestamp: f64) -> Result<(), StreamError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::Push {
            samples,
            origin_timestamp,
            resp: tx,
        })?;
        self.counters.record_push_submitted();
        rx.await?
    }

    /// Queue samples with per-sample timestamps. Lengths must already match.
    pub async fn push_timestamped(
        &self,
        samples: Vec<f64>,
        timestamps: Vec<f64>,
    ) -> Result<(), StreamError> {
        debug_assert_eq!(samples.len(), timestamps.len());
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::PushTimestamped {
            samples,
            timestamps,
            resp: tx,
        })?;
        self.counters.record_push_submitted();
        rx.await?
    }

    /// Ask the analyzer for its latest result.
    pub async fn poll(&self) -> Result<Option<HeartMetrics>, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::Poll { resp: tx })
            .map_err(poll_error)?;
        self.counters.record_poll_submitted();
        rx.await.map_err(|_| StreamError::InvalidPollHandle)?
    }

    /// Stop the session and wait, up to `timeout`, for the worker to drop
    /// its analyzer. A second call returns immediately.
    pub async fn close(&self, timeout: Duration) -> Result<(), StreamError> {
        if !self.stop() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();
        match self
            .send_with_retry(SessionRequest::Close { resp: tx }, timeout)
            .await
        {
            Ok(()) => {}
            // Worker already gone, nothing left to release.
            Err(StreamError::InvalidHandle) => return Ok(()),
            Err(e) => return Err(e),
        }
        match tokio::time::timeout_at(deadline, rx).await {
            Ok(_) => Ok(()),
            Err(_) => Err(StreamError::Execution(format!(
                "worker did not release analyzer within {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

fn poll_error(e: StreamError) -> StreamError {
    match e {
        StreamError::InvalidHandle => StreamError::InvalidPollHandle,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::counters::Counters;
    use crate::dispatch::worker::Dispatcher;
    use crate::engine::Engine;
    use crate::error::ErrorCode;
    use crate::options::AnalyzerOptions;
    use crate::session::Handle;
    use crate::test_support::{wait_until, RecordingEngine};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    async fn spawn(engine: &RecordingEngine, capacity: usize) -> Arc<Dispatcher> {
        let engine: Arc<dyn Engine> = Arc::new(engine.clone());
        let handle = Handle::from_raw(1).unwrap();
        let d = Dispatcher::spawn(
            handle,
            engine,
            &AnalyzerOptions::default(),
            Arc::new(Counters::default()),
            capacity,
        )
        .await
        .expect("spawn");
        Arc::new(d)
    }

    #[tokio::test]
    async fn analyzer_is_created_on_worker_thread() {
        let engine = RecordingEngine::new();
        let _d = spawn(&engine, 4).await;
        let threads = engine.state.create_threads.lock().unwrap().clone();
        assert_eq!(threads, vec!["hrv-session-1".to_string()]);
    }

    #[tokio::test]
    async fn engine_without_instance_fails_spawn() {
        let engine: Arc<dyn Engine> = Arc::new(RecordingEngine::failing());
        let err = Dispatcher::spawn(
            Handle::from_raw(9).unwrap(),
            engine,
            &AnalyzerOptions::default(),
            Arc::new(Counters::default()),
            4,
        )
        .await
        .err()
        .expect("spawn should fail");
        assert_eq!(err.code(), ErrorCode::E004);
    }

    #[tokio::test]
    async fn full_queue_reports_busy() {
        let engine = RecordingEngine::new();
        engine.state.close_gate();
        let d = spawn(&engine, 1).await;

        // First push occupies the worker, second fills the queue.
        let first = tokio::spawn({
            let d = d.clone();
            async move { d.push(vec![1.0], 0.0).await }
        });
        let state = engine.state.clone();
        wait_until(|| state.entered.load(Ordering::SeqCst) == 1).await;
        let second = tokio::spawn({
            let d = d.clone();
            async move { d.push(vec![2.0], 0.0).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = d.push(vec![3.0], 0.0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::E103);

        engine.state.open_gate();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        let m = d.poll().await.unwrap().expect("recorded result");
        assert_eq!(m.rr_list, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn close_cancels_queued_tasks_and_drops_on_worker() {
        let engine = RecordingEngine::new();
        engine.state.close_gate();
        let d = spawn(&engine, 8).await;

        let running = tokio::spawn({
            let d = d.clone();
            async move { d.push(vec![1.0], 0.0).await }
        });
        let state = engine.state.clone();
        wait_until(|| state.entered.load(Ordering::SeqCst) == 1).await;
        let queued_push = tokio::spawn({
            let d = d.clone();
            async move { d.push(vec![2.0], 0.0).await }
        });
        let queued_poll = tokio::spawn({
            let d = d.clone();
            async move { d.poll().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let closer = tokio::spawn({
            let d = d.clone();
            async move { d.close(Duration::from_secs(5)).await }
        });
        wait_until(|| d.is_stopped()).await;
        engine.state.open_gate();

        // The running task finishes normally; queued ones are cancelled.
        running.await.unwrap().unwrap();
        let err = queued_push.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::E101);
        let err = queued_poll.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::E111);
        closer.await.unwrap().unwrap();

        assert_eq!(engine.state.drops.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state.pushes.load(Ordering::SeqCst), 1);
        let threads = engine.state.drop_threads.lock().unwrap().clone();
        assert_eq!(threads, vec!["hrv-session-1".to_string()]);

        assert_eq!(d.push(vec![1.0], 0.0).await.unwrap_err().code(), ErrorCode::E101);
        assert_eq!(d.poll().await.unwrap_err().code(), ErrorCode::E111);
        d.close(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn close_times_out_when_worker_is_stuck() {
        let engine = RecordingEngine::new();
        engine.state.close_gate();
        let d = spawn(&engine, 4).await;
        let running = tokio::spawn({
            let d = d.clone();
            async move { d.push(vec![1.0], 0.0).await }
        });
        let state = engine.state.clone();
        wait_until(|| state.entered.load(Ordering::SeqCst) == 1).await;

        let err = d.close(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::E900);

        engine.state.open_gate();
        running.await.unwrap().unwrap();
        let state = engine.state.clone();
        wait_until(|| state.drops.load(Ordering::SeqCst) == 1).await;
    }
}
