//! Reference sliding-window analyzer.
//!
//! Keeps the most recent `window_sec` of signal, emits a result at most once
//! per update interval, and derives beats with a moving-average threshold
//! detector. Good enough to drive the CLI and the integration tests; it does
//! not try to reproduce any particular HRV toolkit's numbers.

use std::collections::VecDeque;

use crate::engine::{Analyzer, Engine, HeartMetrics, QualityInfo};
use crate::error::EngineError;
use crate::options::{AnalyzerOptions, Peak, SdsdMode, TimeDomain};

const FALLBACK_FS: f64 = 50.0;
const FALLBACK_WINDOW_SEC: f64 = 10.0;
/// Longest window kept; larger settings are clamped.
pub const MAX_WINDOW_SEC: f64 = 600.0;
const MIN_UPDATE_SEC: f64 = 0.1;
/// Rolling-mean span used as the detection baseline.
const MOVING_AVERAGE_SEC: f64 = 0.75;
const CLOCK_EPS: f64 = 1e-9;

/// Engine producing [`WindowedAnalyzer`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowedEngine;

impl Engine for WindowedEngine {
    fn create(&self, opts: &AnalyzerOptions) -> Option<Box<dyn Analyzer>> {
        Some(Box::new(WindowedAnalyzer::new(opts)))
    }
}

#[derive(Debug)]
pub struct WindowedAnalyzer {
    opts: AnalyzerOptions,
    fs: f64,
    capacity: usize,
    update_sec: f64,
    warmup_sec: f64,
    window: VecDeque<f64>,
    /// Seconds of signal received so far.
    clock_sec: f64,
    last_emit_sec: Option<f64>,
    last_timestamp: Option<f64>,
}

impl WindowedAnalyzer {
    pub fn new(opts: &AnalyzerOptions) -> Self {
        let fs = if opts.fs.is_finite() && opts.fs > 0.0 {
            opts.fs
        } else {
            FALLBACK_FS
        };
        let window_sec = if opts.streaming.window_sec >= 1.0 {
            opts.streaming.window_sec.min(MAX_WINDOW_SEC)
        } else {
            FALLBACK_WINDOW_SEC
        };
        let update_sec = if opts.streaming.update_interval_sec > 0.0 {
            opts.streaming.update_interval_sec.max(MIN_UPDATE_SEC)
        } else {
            1.0
        };
        let warmup_sec = if opts.streaming.warmup_sec.is_finite() {
            opts.streaming.warmup_sec.clamp(0.0, window_sec)
        } else {
            0.0
        };
        let capacity = ((window_sec * fs).ceil() as usize).max(1);

        Self {
            opts: opts.clone(),
            fs,
            capacity,
            update_sec,
            warmup_sec,
            window: VecDeque::new(),
            clock_sec: 0.0,
            last_emit_sec: None,
            last_timestamp: None,
        }
    }

    /// Samples currently held in the window.
    /// Samples the window holds before evicting.
    pub fn window_capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Seconds of signal received since creation.
    pub fn clock_sec(&self) -> f64 {
        self.clock_sec
    }

    fn append(&mut self, samples: &[f64]) {
        for &x in samples.iter().filter(|x| x.is_finite()) {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(x);
        }
    }
}

impl Analyzer for WindowedAnalyzer {
    fn push(&mut self, samples: &[f64], _origin_timestamp: f64) -> Result<(), EngineError> {
        self.append(samples);
        self.clock_sec += samples.len() as f64 / self.fs;
        Ok(())
    }

    fn push_timestamped(&mut self, samples: &[f64], timestamps: &[f64]) -> Result<(), EngineError> {
        if timestamps.iter().any(|t| !t.is_finite()) {
            return Err(EngineError::Rejected("non-finite timestamp".into()));
        }
        let mut prev = self.last_timestamp;
        for &t in timestamps {
            if prev.is_some_and(|p| t < p) {
                return Err(EngineError::Rejected(format!(
                    "timestamps must not decrease ({} after {})",
                    t,
                    prev.unwrap_or(t)
                )));
            }
            prev = Some(t);
        }

        let Some(last) = timestamps.last().copied() else {
            return Ok(());
        };
        let advance = match self.last_timestamp {
            Some(p) => last - p,
            None => samples.len() as f64 / self.fs,
        };
        self.append(samples);
        self.clock_sec += advance;
        self.last_timestamp = Some(last);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<HeartMetrics>, EngineError> {
        if self.window.is_empty() || self.clock_sec + CLOCK_EPS < self.warmup_sec {
            return Ok(None);
        }
        if let Some(last) = self.last_emit_sec {
            if self.clock_sec - last + CLOCK_EPS < self.update_sec {
                return Ok(None);
            }
        }
        self.last_emit_sec = Some(self.clock_sec);

        let signal = self.window.make_contiguous();
        Ok(Some(analyze(signal, self.fs, &self.opts)))
    }
}

fn analyze(signal: &[f64], fs: f64, opts: &AnalyzerOptions) -> HeartMetrics {
    let peaks = detect_peaks(signal, fs, &opts.peak);
    let ibi: Vec<f64> = peaks
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 * 1000.0 / fs)
        .collect();

    let min_rr = 60_000.0 / opts.peak.bpm_max;
    let max_rr = 60_000.0 / opts.peak.bpm_min;
    let rr: Vec<f64> = ibi
        .iter()
        .copied()
        .filter(|v| (min_rr..=max_rr).contains(v))
        .collect();
    let rejected = ibi.len() - rr.len();

    let mut m = HeartMetrics {
        bpm: if rr.is_empty() { 0.0 } else { 60_000.0 / mean(&rr) },
        ..HeartMetrics::default()
    };
    time_domain(&rr, &opts.time_domain, &mut m);

    let rejection_rate = if ibi.is_empty() {
        0.0
    } else {
        rejected as f64 / ibi.len() as f64
    };
    let enough = rr.len() >= 2;
    let good_quality = enough && rejection_rate <= opts.quality.segment_reject_threshold;
    let quality_warning = if !enough {
        Some("insufficient beats in window".to_string())
    } else if !good_quality {
        Some("high RR rejection rate".to_string())
    } else {
        None
    };
    m.quality = QualityInfo {
        total_beats: peaks.len(),
        rejected_beats: rejected,
        rejection_rate,
        good_quality,
        quality_warning,
        confidence: if rr.is_empty() {
            0.0
        } else {
            (1.0 - rejection_rate).clamp(0.0, 1.0)
        },
    };

    m.ibi_ms = ibi;
    m.rr_list = rr;
    m.peak_list = peaks;
    m
}

/// Threshold peaks against a rolling mean lifted by a fraction of the
/// window's standard deviation, then merge peaks closer than the refractory
/// period, keeping the taller one.
fn detect_peaks(signal: &[f64], fs: f64, peak: &Peak) -> Vec<usize> {
    let n = signal.len();
    if n < 3 {
        return Vec::new();
    }
    let sd = std_dev(signal);
    if !(sd > 0.0) {
        return Vec::new();
    }
    let lift = peak.threshold_scale * sd;
    let half = ((MOVING_AVERAGE_SEC * fs / 2.0).round() as usize).max(1);
    let refractory = (peak.refractory_ms * fs / 1000.0).round() as usize;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &x in signal {
        prefix.push(prefix[prefix.len() - 1] + x);
    }
    let above = |i: usize| {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        let ma = (prefix[hi] - prefix[lo]) / (hi - lo) as f64;
        signal[i] > ma + lift
    };

    let mut peaks: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < n {
        if !above(i) {
            i += 1;
            continue;
        }
        let mut best = i;
        while i < n && above(i) {
            if signal[i] > signal[best] {
                best = i;
            }
            i += 1;
        }
        if let Some(last) = peaks.last_mut() {
            if best - *last < refractory {
                if signal[best] > signal[*last] {
                    *last = best;
                }
                continue;
            }
        }
        peaks.push(best);
    }
    peaks
}

fn time_domain(rr: &[f64], td: &TimeDomain, m: &mut HeartMetrics) {
    if rr.is_empty() {
        return;
    }
    m.sdnn = std_dev(rr);
    let med = median(rr);
    let deviations: Vec<f64> = rr.iter().map(|v| (v - med).abs()).collect();
    m.mad = median(&deviations);

    let diffs: Vec<f64> = rr.windows(2).map(|w| w[1] - w[0]).collect();
    if diffs.is_empty() {
        return;
    }
    m.rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    m.sdsd = match td.sdsd_mode {
        SdsdMode::Abs => std_dev(&diffs.iter().map(|d| d.abs()).collect::<Vec<_>>()),
        SdsdMode::Signed => std_dev(&diffs),
    };
    m.nn20 = diffs.iter().filter(|d| d.abs() > 20.0).count() as f64;
    m.nn50 = diffs.iter().filter(|d| d.abs() > 50.0).count() as f64;
    let scale = if td.pnn_as_percent { 100.0 } else { 1.0 };
    m.pnn20 = m.nn20 / diffs.len() as f64 * scale;
    m.pnn50 = m.nn50 / diffs.len() as f64 * scale;
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64).sqrt()
}

fn median(xs: &[f64]) -> f64 {
    let mut v = xs.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Synthetic pulse train: one sine cycle per beat, `start` is the index of
/// the first generated sample so consecutive chunks line up.
pub fn pulse_wave(fs: f64, bpm: f64, start: usize, len: usize) -> Vec<f64> {
    let freq = bpm / 60.0;
    (start..start + len)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::engine::windowed::{detect_peaks, pulse_wave, WindowedAnalyzer, MAX_WINDOW_SEC};
    use crate::engine::Analyzer;
    use crate::error::EngineError;
    use crate::options::{AnalyzerOptions, Peak};

    fn analyzer(fs: f64) -> WindowedAnalyzer {
        WindowedAnalyzer::new(&AnalyzerOptions::builder(fs).window_sec(20.0).build())
    }

    #[test]
    fn nothing_before_warmup() {
        let mut a = analyzer(100.0);
        a.push(&pulse_wave(100.0, 72.0, 0, 512), 0.0).unwrap();
        assert!(a.poll().unwrap().is_none());
    }

    #[test]
    fn emits_then_throttles_by_update_interval() {
        let mut a = analyzer(100.0);
        a.push(&pulse_wave(100.0, 72.0, 0, 1000), 0.0).unwrap();
        let m = a.poll().unwrap().expect("result after warm-up");
        assert!((68.0..=76.0).contains(&m.bpm), "bpm={}", m.bpm);
        assert!(m.quality.good_quality);
        assert!(m.quality.confidence > 0.9);
        assert!(m.sdnn < 10.0);

        assert!(a.poll().unwrap().is_none());
        a.push(&pulse_wave(100.0, 72.0, 1000, 50), 10.0).unwrap();
        assert!(a.poll().unwrap().is_none());
        a.push(&pulse_wave(100.0, 72.0, 1050, 50), 10.5).unwrap();
        assert!(a.poll().unwrap().is_some());
    }

    #[test]
    fn window_is_trimmed() {
        let mut a = analyzer(50.0);
        for chunk in 0..30 {
            a.push(&pulse_wave(50.0, 60.0, chunk * 50, 50), chunk as f64).unwrap();
        }
        assert_eq!(a.buffered(), 1000);
        assert!((a.clock_sec() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_window_is_clamped() {
        for window_sec in [1e13, f64::INFINITY] {
            let opts = AnalyzerOptions::builder(100.0).window_sec(window_sec).build();
            let mut a = WindowedAnalyzer::new(&opts);
            assert_eq!(a.window_capacity(), (MAX_WINDOW_SEC * 100.0) as usize);
            a.push(&pulse_wave(100.0, 60.0, 0, 200), 0.0).unwrap();
            assert_eq!(a.buffered(), 200);
        }
    }

    #[test]
    fn non_finite_samples_are_skipped() {
        let mut a = analyzer(50.0);
        a.push(&[1.0, f64::NAN, 2.0, f64::INFINITY], 0.0).unwrap();
        assert_eq!(a.buffered(), 2);
    }

    #[test]
    fn decreasing_timestamps_are_rejected() {
        let mut a = analyzer(10.0);
        let err = a
            .push_timestamped(&[1.0, 2.0, 3.0], &[0.0, 0.2, 0.1])
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
        assert_eq!(a.buffered(), 0);

        a.push_timestamped(&[1.0, 2.0], &[1.0, 1.1]).unwrap();
        let err = a.push_timestamped(&[3.0], &[0.5]).unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
    }

    #[test]
    fn timestamps_drive_the_clock() {
        let mut a = analyzer(10.0);
        a.push_timestamped(&[0.0; 10], &[0.0; 10]).unwrap();
        assert!((a.clock_sec() - 1.0).abs() < 1e-9);
        let ts: Vec<f64> = (0..10).map(|i| 3.0 + i as f64 * 0.1).collect();
        a.push_timestamped(&[0.0; 10], &ts).unwrap();
        assert!((a.clock_sec() - 4.9).abs() < 1e-9);
    }

    #[test]
    fn refractory_merges_close_peaks() {
        let mut signal = vec![0.0; 200];
        signal[50] = 1.0;
        signal[55] = 0.8;
        signal[150] = 1.0;
        let peak = Peak {
            refractory_ms: 250.0,
            ..Peak::default()
        };
        assert_eq!(detect_peaks(&signal, 100.0, &peak), vec![50, 150]);
    }

    #[test]
    fn flat_signal_has_no_beats() {
        let mut a = analyzer(50.0);
        a.push(&[0.5; 500], 0.0).unwrap();
        let m = a.poll().unwrap().expect("result");
        assert!(m.peak_list.is_empty());
        assert_eq!(m.bpm, 0.0);
        assert!(!m.quality.good_quality);
        assert!(m.quality.quality_warning.is_some());
        assert_eq!(m.quality.confidence, 0.0);
    }
}
