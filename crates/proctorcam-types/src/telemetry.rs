use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-cycle state machine of the snapshot capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Idle,
    Sampling,
    Validating,
    Rejected,
    Encoding,
    Uploading,
    ReportedSuccess,
    ReportedFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CycleResult {
    Success { url: String, bytes: usize },
    Failed { reason: String },
    /// No stream or no frame data yet; nothing was reported.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub sequence: u64,
    pub key: Option<String>,
    pub result: CycleResult,
    pub final_state: CycleState,
    pub black_pixel_pct: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, CycleResult::Success { .. })
    }
}

/// Running totals kept by the capture loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMetrics {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped_cycles: u64,
    /// Ticks dropped because the previous cycle was still in flight.
    pub skipped_ticks: u64,
    pub uploaded_bytes: u64,
}

impl CaptureMetrics {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match &outcome.result {
            CycleResult::Success { bytes, .. } => {
                self.successes += 1;
                self.uploaded_bytes += *bytes as u64;
            }
            CycleResult::Failed { .. } => self.failures += 1,
            CycleResult::Skipped => self.skipped_cycles += 1,
        }
    }
}
