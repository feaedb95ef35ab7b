//! Pre-creation option validation.
//!
//! Rules run in a fixed order and the first failure wins, so a configuration
//! with several bad fields always reports the same code. Fields without a rule
//! are accepted as-is.

use crate::error::ErrorCode;
use crate::options::AnalyzerOptions;
use serde::Serialize;

pub const MIN_SAMPLE_RATE: f64 = 1.0;
pub const MAX_SAMPLE_RATE: f64 = 10_000.0;
pub const MIN_NFFT: u32 = 64;
pub const MAX_NFFT: u32 = 16_384;
pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 240.0;
pub const MIN_REFRACTORY_MS: f64 = 50.0;
pub const MAX_REFRACTORY_MS: f64 = 2000.0;

/// The first rule a configuration breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    SampleRate,
    Bandpass,
    Nfft,
    BpmRange,
    Refractory,
}

impl Violation {
    pub fn code(&self) -> ErrorCode {
        match self {
            Violation::SampleRate => ErrorCode::E001,
            Violation::Bandpass => ErrorCode::E011,
            Violation::Nfft => ErrorCode::E012,
            Violation::BpmRange => ErrorCode::E013,
            Violation::Refractory => ErrorCode::E014,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Violation::SampleRate => "Invalid sample rate (1-10000 Hz)",
            Violation::Bandpass => "Invalid bandpass (0<=low<high<=fs/2)",
            Violation::Nfft => "Invalid nfft (64-16384)",
            Violation::BpmRange => "Invalid BPM range (30<=min<max<=240)",
            Violation::Refractory => "Invalid refractory (50-2000 ms)",
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Check `opts` against the creation rules.
///
/// Comparisons are written so that NaN fails the rule it appears in.
pub fn validate(opts: &AnalyzerOptions) -> Result<(), Violation> {
    let fs = opts.fs;
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&fs) {
        return Err(Violation::SampleRate);
    }

    let bp = &opts.bandpass;
    if !(bp.low_hz >= 0.0 && bp.low_hz < bp.high_hz && bp.high_hz <= fs * 0.5) {
        return Err(Violation::Bandpass);
    }

    if !(MIN_NFFT..=MAX_NFFT).contains(&opts.welch.nfft) {
        return Err(Violation::Nfft);
    }

    let peak = &opts.peak;
    if !(peak.bpm_min >= MIN_BPM && peak.bpm_min < peak.bpm_max && peak.bpm_max <= MAX_BPM) {
        return Err(Violation::BpmRange);
    }

    if !(MIN_REFRACTORY_MS..=MAX_REFRACTORY_MS).contains(&peak.refractory_ms) {
        return Err(Violation::Refractory);
    }

    Ok(())
}
