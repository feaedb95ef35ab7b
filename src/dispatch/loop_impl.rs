//! Session worker loop.

use crate::dispatch::counters::Counters;
use crate::dispatch::request::SessionRequest;
use crate::engine::Analyzer;
use crate::error::{EngineError, StreamError};
use crate::session::Handle;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, info, trace, warn};

/// Log result with debug on success and warn on error.
macro_rules! log_result {
    ($handle:expr, $result:expr, $ok_msg:literal, $err_msg:literal) => {
        match &$result {
            Ok(_) => debug!(handle = %$handle, $ok_msg),
            Err(e) => warn!(handle = %$handle, error = %e, $err_msg),
        }
    };
}

/// Run `f`, turning a panic into its message.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one analyzer call, converting engine failures and panics to
/// execution errors.
fn guarded<T>(f: impl FnOnce() -> Result<T, EngineError>) -> Result<T, StreamError> {
    match catch_panic(f) {
        Ok(result) => result.map_err(StreamError::from),
        Err(msg) => Err(EngineError::Panicked(msg).into()),
    }
}

/// Drive one session's analyzer until it is closed or every sender is gone.
///
/// Tasks are taken strictly in queue order and run one at a time. Once
/// `stopped` is set every task still queued is answered with a handle error
/// instead of running.
pub(crate) fn run_session_loop(
    handle: Handle,
    rx: mpsc::Receiver<SessionRequest>,
    mut analyzer: Box<dyn Analyzer>,
    stopped: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    debug!(handle = %handle, "Session worker started");

    while let Ok(req) = rx.recv() {
        match req {
            SessionRequest::Close { resp } => {
                let mut cancelled = 0usize;
                while let Ok(pending) = rx.try_recv() {
                    pending.cancel();
                    cancelled += 1;
                }
                info!(handle = %handle, cancelled, "Closing session");
                if let Err(msg) = catch_panic(move || drop(analyzer)) {
                    warn!(handle = %handle, error = %msg, "Analyzer panicked while dropping");
                }
                let _ = resp.send(());
                return;
            }
            req if stopped.load(Ordering::Acquire) => {
                trace!(handle = %handle, kind = req.kind(), "Cancelling task of stopped session");
                req.cancel();
            }
            SessionRequest::Push {
                samples,
                origin_timestamp,
                resp,
            } => {
                trace!(handle = %handle, samples = samples.len(), origin_timestamp, "Push");
                let result = guarded(|| analyzer.push(&samples, origin_timestamp));
                log_result!(handle, result, "Samples pushed", "Push failed");
                counters.record_push_completed();
                let _ = resp.send(result);
            }
            SessionRequest::PushTimestamped {
                samples,
                timestamps,
                resp,
            } => {
                trace!(handle = %handle, samples = samples.len(), "Timestamped push");
                let result = guarded(|| analyzer.push_timestamped(&samples, &timestamps));
                log_result!(handle, result, "Timestamped samples pushed", "Timestamped push failed");
                counters.record_push_completed();
                let _ = resp.send(result);
            }
            SessionRequest::Poll { resp } => {
                let result = guarded(|| analyzer.poll());
                match &result {
                    Ok(Some(m)) => debug!(
                        handle = %handle,
                        bpm = m.bpm,
                        beats = m.quality.total_beats,
                        confidence = m.quality.confidence,
                        "Result ready"
                    ),
                    Ok(None) => trace!(handle = %handle, "No result yet"),
                    Err(e) => warn!(handle = %handle, error = %e, "Poll failed"),
                }
                counters.record_poll_completed();
                let _ = resp.send(result);
            }
        }
    }

    debug!(handle = %handle, "Session channel closed, dropping analyzer");
}
