//! Instrumented engine shared by the dispatcher and manager tests.

use crate::engine::{Analyzer, Engine, HeartMetrics};
use crate::error::EngineError;
use crate::options::AnalyzerOptions;
use crate::validate::Violation;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A push whose first sample is this value panics inside the analyzer.
pub const PANIC_SAMPLE: f64 = -999.0;
/// A push whose first sample is this value is rejected by the analyzer.
pub const REJECT_SAMPLE: f64 = -1000.0;

#[derive(Default)]
pub struct RecordingState {
    pub creates: AtomicUsize,
    pub drops: AtomicUsize,
    /// Completed engine push calls, both kinds.
    pub pushes: AtomicUsize,
    pub polls: AtomicUsize,
    /// Calls that got past the entry point, gated or not.
    pub entered: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub create_threads: Mutex<Vec<String>>,
    pub drop_threads: Mutex<Vec<String>>,
    gate_closed: Mutex<bool>,
    gate: Condvar,
}

impl RecordingState {
    /// Make every subsequent analyzer call block until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        *self.gate_closed.lock().unwrap() = true;
    }

    pub fn open_gate(&self) {
        *self.gate_closed.lock().unwrap() = false;
        self.gate.notify_all();
    }

    fn enter(&self, delay: Duration) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut closed = self.gate_closed.lock().unwrap();
        while *closed {
            closed = self.gate.wait(closed).unwrap();
        }
        drop(closed);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn thread_name() -> String {
    std::thread::current().name().unwrap_or("<unnamed>").to_string()
}

#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub state: Arc<RecordingState>,
    pub delay: Duration,
    pub fail_create: bool,
    pub reject: Option<Violation>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn rejecting(v: Violation) -> Self {
        Self {
            reject: Some(v),
            ..Self::default()
        }
    }
}

impl Engine for RecordingEngine {
    fn create(&self, _opts: &AnalyzerOptions) -> Option<Box<dyn Analyzer>> {
        if self.fail_create {
            return None;
        }
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        self.state.create_threads.lock().unwrap().push(thread_name());
        Some(Box::new(RecordingAnalyzer {
            state: self.state.clone(),
            delay: self.delay,
            received: Vec::new(),
            timestamps: Vec::new(),
            push_calls: 0,
        }))
    }

    fn validate(&self, _opts: &AnalyzerOptions) -> Option<Violation> {
        self.reject
    }
}

/// Records everything it is fed. Poll reports the received samples as
/// `rr_list`, the timestamps as `ibi_ms` and the number of pushes as `bpm`.
struct RecordingAnalyzer {
    state: Arc<RecordingState>,
    delay: Duration,
    received: Vec<f64>,
    timestamps: Vec<f64>,
    push_calls: usize,
}

impl RecordingAnalyzer {
    fn check(samples: &[f64]) -> Result<(), EngineError> {
        match samples.first() {
            Some(&x) if x == PANIC_SAMPLE => panic!("analyzer panic on marker sample"),
            Some(&x) if x == REJECT_SAMPLE => Err(EngineError::Rejected("marker sample rejected".into())),
            _ => Ok(()),
        }
    }
}

impl Analyzer for RecordingAnalyzer {
    fn push(&mut self, samples: &[f64], _origin_timestamp: f64) -> Result<(), EngineError> {
        Self::check(samples)?;
        self.state.enter(self.delay);
        self.received.extend_from_slice(samples);
        self.push_calls += 1;
        self.state.exit();
        self.state.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn push_timestamped(&mut self, samples: &[f64], timestamps: &[f64]) -> Result<(), EngineError> {
        Self::check(samples)?;
        self.state.enter(self.delay);
        self.received.extend_from_slice(samples);
        self.timestamps.extend_from_slice(timestamps);
        self.push_calls += 1;
        self.state.exit();
        self.state.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<HeartMetrics>, EngineError> {
        self.state.enter(self.delay);
        self.state.exit();
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        if self.received.is_empty() {
            return Ok(None);
        }
        Ok(Some(HeartMetrics {
            bpm: self.push_calls as f64,
            rr_list: self.received.clone(),
            ibi_ms: self.timestamps.clone(),
            ..HeartMetrics::default()
        }))
    }
}

impl Drop for RecordingAnalyzer {
    fn drop(&mut self) {
        self.state.drops.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut threads) = self.state.drop_threads.lock() {
            threads.push(thread_name());
        }
    }
}

/// Yield to the runtime until `cond` holds, failing after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
