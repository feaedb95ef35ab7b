//! Result types produced by analyzers.

use serde::Serialize;

/// Signal quality summary attached to every emitted result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityInfo {
    pub total_beats: usize,
    pub rejected_beats: usize,
    pub rejection_rate: f64,
    pub good_quality: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_warning: Option<String>,
    /// 0..1, 0 when unavailable.
    pub confidence: f64,
}

/// Heart-rate metrics for the current analysis window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartMetrics {
    pub bpm: f64,
    pub ibi_ms: Vec<f64>,
    pub rr_list: Vec<f64>,
    /// Peak positions as sample indices into the analysis window.
    pub peak_list: Vec<usize>,

    pub sdnn: f64,
    pub rmssd: f64,
    pub sdsd: f64,
    pub pnn20: f64,
    pub pnn50: f64,
    pub nn20: f64,
    pub nn50: f64,
    pub mad: f64,

    pub quality: QualityInfo,
}
