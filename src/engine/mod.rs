//! Analyzer engine boundary.
//!
//! An [`Engine`] is a factory shared by every session; each session gets its
//! own [`Analyzer`] instance. Instances are created, driven and dropped on the
//! session's worker thread only, so `Analyzer` carries no `Send` or `Sync`
//! bound and implementations need no internal locking. Dropping the boxed
//! analyzer is the destroy operation.

mod types;
mod windowed;

pub use types::{HeartMetrics, QualityInfo};
pub use windowed::{pulse_wave, WindowedAnalyzer, WindowedEngine};

use crate::error::EngineError;
use crate::options::AnalyzerOptions;
use crate::validate::Violation;

/// Factory for per-session analyzer instances.
pub trait Engine: Send + Sync + 'static {
    /// Build an analyzer for `opts`. `None` means the engine could not
    /// instantiate one; the session is not registered.
    fn create(&self, opts: &AnalyzerOptions) -> Option<Box<dyn Analyzer>>;

    /// Engine-specific pre-creation check, consulted after the built-in rules.
    fn validate(&self, _opts: &AnalyzerOptions) -> Option<Violation> {
        None
    }
}

/// A stateful, single-threaded streaming analyzer.
pub trait Analyzer {
    /// Append samples whose first element was taken at `origin_timestamp`.
    fn push(&mut self, samples: &[f64], origin_timestamp: f64) -> Result<(), EngineError>;

    /// Append samples with one timestamp each. Both slices have equal length.
    fn push_timestamped(&mut self, samples: &[f64], timestamps: &[f64]) -> Result<(), EngineError>;

    /// Return a new result if one is ready.
    fn poll(&mut self) -> Result<Option<HeartMetrics>, EngineError>;
}

impl<E: Engine + ?Sized> Engine for std::sync::Arc<E> {
    fn create(&self, opts: &AnalyzerOptions) -> Option<Box<dyn Analyzer>> {
        (**self).create(opts)
    }

    fn validate(&self, opts: &AnalyzerOptions) -> Option<Violation> {
        (**self).validate(opts)
    }
}
