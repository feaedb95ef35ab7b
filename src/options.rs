//! Analyzer options and manager configuration.
//!
//! [`AnalyzerOptions`] is the fully-resolved, immutable configuration a
//! session is created with. It deserializes from the nested camelCase option
//! document (`{"bandpass": {"lowHz": 0.5}, "peak": {"bpmMin": 40}}`) with every
//! missing field taking its default, or it can be assembled with
//! [`AnalyzerOptions::builder`].

use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard cap on samples accepted by a single push.
pub const MAX_SAMPLES_PER_PUSH: usize = 5000;
/// Default depth of each session's request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Default bound on how long destroy waits for a worker to release its engine.
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bandpass {
    pub low_hz: f64,
    pub high_hz: f64,
    pub order: u32,
}

impl Default for Bandpass {
    fn default() -> Self {
        Self {
            low_hz: 0.5,
            high_hz: 5.0,
            order: 2,
        }
    }
}

/// Welch PSD parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Welch {
    pub nfft: u32,
    pub overlap: f64,
    pub wsize_sec: f64,
}

impl Default for Welch {
    fn default() -> Self {
        Self {
            nfft: 256,
            overlap: 0.5,
            wsize_sec: 240.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Peak {
    pub refractory_ms: f64,
    pub threshold_scale: f64,
    pub bpm_min: f64,
    pub bpm_max: f64,
}

impl Default for Peak {
    fn default() -> Self {
        Self {
            refractory_ms: 250.0,
            threshold_scale: 0.5,
            bpm_min: 40.0,
            bpm_max: 180.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preprocessing {
    pub interp_clipping: bool,
    pub clipping_threshold: f64,
    pub hampel_correct: bool,
    pub hampel_window: u32,
    pub hampel_threshold: f64,
    pub remove_baseline_wander: bool,
    pub enhance_peaks: bool,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            interp_clipping: false,
            clipping_threshold: 1020.0,
            hampel_correct: false,
            hampel_window: 6,
            hampel_threshold: 3.0,
            remove_baseline_wander: false,
            enhance_peaks: false,
        }
    }
}

/// RR-interval outlier removal strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanMethod {
    #[default]
    QuotientFilter,
    Iqr,
    ZScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Quality {
    pub reject_segmentwise: bool,
    pub segment_reject_threshold: f64,
    pub segment_reject_max_rejects: u32,
    pub segment_reject_window_beats: u32,
    pub segment_reject_overlap: f64,
    #[serde(rename = "cleanRR")]
    pub clean_rr: bool,
    pub clean_method: CleanMethod,
    #[serde(rename = "thresholdRR")]
    pub threshold_rr: bool,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            reject_segmentwise: false,
            segment_reject_threshold: 0.3,
            segment_reject_max_rejects: 3,
            segment_reject_window_beats: 10,
            segment_reject_overlap: 0.0,
            clean_rr: false,
            clean_method: CleanMethod::QuotientFilter,
            threshold_rr: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdsdMode {
    Signed,
    #[default]
    Abs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeDomain {
    pub sdsd_mode: SdsdMode,
    pub pnn_as_percent: bool,
}

impl Default for TimeDomain {
    fn default() -> Self {
        Self {
            sdsd_mode: SdsdMode::Abs,
            pnn_as_percent: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoincareMode {
    Formula,
    #[default]
    Masked,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Poincare {
    pub mode: PoincareMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighPrecision {
    pub enabled: bool,
    pub target_fs: f64,
}

impl Default for HighPrecision {
    fn default() -> Self {
        Self {
            enabled: false,
            target_fs: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Segmentwise {
    pub width: f64,
    pub overlap: f64,
    pub min_size: f64,
    pub replace_outliers: bool,
}

impl Default for Segmentwise {
    fn default() -> Self {
        Self {
            width: 120.0,
            overlap: 0.0,
            min_size: 20.0,
            replace_outliers: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RrSpline {
    pub s: f64,
    pub target_sse: f64,
    pub smooth: f64,
}

impl Default for RrSpline {
    fn default() -> Self {
        Self {
            s: 10.0,
            target_sse: 0.0,
            smooth: 0.1,
        }
    }
}

/// Sliding-window behaviour of a streaming analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Streaming {
    pub window_sec: f64,
    pub update_interval_sec: f64,
    /// Signal required before the first result is emitted.
    pub warmup_sec: f64,
}

impl Default for Streaming {
    fn default() -> Self {
        Self {
            window_sec: 60.0,
            update_interval_sec: 1.0,
            warmup_sec: 8.0,
        }
    }
}

/// Fully-resolved analyzer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerOptions {
    /// Sample rate in Hz.
    pub fs: f64,
    pub bandpass: Bandpass,
    pub welch: Welch,
    pub peak: Peak,
    pub preprocessing: Preprocessing,
    pub quality: Quality,
    pub time_domain: TimeDomain,
    pub poincare: Poincare,
    pub high_precision: HighPrecision,
    pub segmentwise: Segmentwise,
    pub rr_spline: RrSpline,
    pub breathing_as_bpm: bool,
    pub streaming: Streaming,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            fs: 50.0,
            bandpass: Bandpass::default(),
            welch: Welch::default(),
            peak: Peak::default(),
            preprocessing: Preprocessing::default(),
            quality: Quality::default(),
            time_domain: TimeDomain::default(),
            poincare: Poincare::default(),
            high_precision: HighPrecision::default(),
            segmentwise: Segmentwise::default(),
            rr_spline: RrSpline::default(),
            breathing_as_bpm: false,
            streaming: Streaming::default(),
        }
    }
}

impl AnalyzerOptions {
    /// Start a builder for the given sample rate.
    pub fn builder(fs: f64) -> AnalyzerOptionsBuilder {
        AnalyzerOptionsBuilder {
            opts: AnalyzerOptions {
                fs,
                ..AnalyzerOptions::default()
            },
        }
    }

    /// Parse an options document. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, StreamError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read and parse an options document from disk.
    pub fn from_json_file(path: &Path) -> Result<Self, StreamError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Options(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }
}

/// Fluent construction of [`AnalyzerOptions`].
#[derive(Debug, Clone)]
pub struct AnalyzerOptionsBuilder {
    opts: AnalyzerOptions,
}

impl AnalyzerOptionsBuilder {
    pub fn bandpass(mut self, low_hz: f64, high_hz: f64, order: u32) -> Self {
        self.opts.bandpass = Bandpass {
            low_hz,
            high_hz,
            order,
        };
        self
    }

    pub fn nfft(mut self, nfft: u32) -> Self {
        self.opts.welch.nfft = nfft;
        self
    }

    pub fn welch_overlap(mut self, overlap: f64) -> Self {
        self.opts.welch.overlap = overlap;
        self
    }

    pub fn refractory_ms(mut self, ms: f64) -> Self {
        self.opts.peak.refractory_ms = ms;
        self
    }

    pub fn threshold_scale(mut self, scale: f64) -> Self {
        self.opts.peak.threshold_scale = scale;
        self
    }

    pub fn bpm_range(mut self, min: f64, max: f64) -> Self {
        self.opts.peak.bpm_min = min;
        self.opts.peak.bpm_max = max;
        self
    }

    pub fn clean_rr(mut self, method: CleanMethod) -> Self {
        self.opts.quality.clean_rr = true;
        self.opts.quality.clean_method = method;
        self
    }

    pub fn breathing_as_bpm(mut self, on: bool) -> Self {
        self.opts.breathing_as_bpm = on;
        self
    }

    pub fn window_sec(mut self, sec: f64) -> Self {
        self.opts.streaming.window_sec = sec;
        self
    }

    pub fn update_interval_sec(mut self, sec: f64) -> Self {
        self.opts.streaming.update_interval_sec = sec;
        self
    }

    pub fn warmup_sec(mut self, sec: f64) -> Self {
        self.opts.streaming.warmup_sec = sec;
        self
    }

    pub fn build(self) -> AnalyzerOptions {
        self.opts
    }
}

/// Runtime knobs of a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerConfig {
    /// Largest batch a single push may carry.
    pub max_samples_per_push: usize,
    /// Bounded depth of each session's request queue.
    pub queue_capacity: usize,
    /// How long destroy waits for the worker to drop its analyzer.
    #[serde(with = "duration_secs")]
    pub close_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_samples_per_push: MAX_SAMPLES_PER_PUSH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
        }
    }
}

impl ManagerConfig {
    /// Clamp user-supplied values into their usable range.
    pub(crate) fn normalized(mut self) -> Self {
        self.max_samples_per_push = self.max_samples_per_push.clamp(1, MAX_SAMPLES_PER_PUSH);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
