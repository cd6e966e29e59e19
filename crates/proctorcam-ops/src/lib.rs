//! Operational helpers: logging, telemetry, device status and fingerprinting.

use std::{collections::VecDeque, sync::Arc};

use proctorcam_types::{
    config::OpsConfig,
    events::ProctorEvent,
    telemetry::{CaptureMetrics, CycleOutcome},
    ProctorError, Result,
};
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

pub mod device;
pub mod fingerprint;

pub use device::{
    forward_signals, BatteryMonitor, DeviceSignal, DeviceStatusTracker, ScreenMonitor, Visibility,
};
pub use fingerprint::device_fingerprint;

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ProctorError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ProctorError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Recent events and cycles kept by default; counters cover the whole session.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 256;

/// In-memory record of reported events and capture cycle outcomes.
///
/// Only the most recent entries are retained; `CaptureMetrics` keeps the
/// session totals.
#[derive(Clone)]
pub struct TelemetryStore {
    capacity: usize,
    events: Arc<Mutex<VecDeque<ProctorEvent>>>,
    cycles: Arc<Mutex<VecDeque<CycleOutcome>>>,
    metrics: Arc<Mutex<CaptureMetrics>>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TELEMETRY_CAPACITY)
    }
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            cycles: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            metrics: Arc::new(Mutex::new(CaptureMetrics::default())),
        }
    }

    pub async fn record_event(&self, event: ProctorEvent) -> Result<()> {
        push_bounded(&mut *self.events.lock().await, event, self.capacity);
        Ok(())
    }

    pub async fn record_cycle(&self, outcome: CycleOutcome) -> Result<()> {
        self.metrics.lock().await.record(&outcome);
        push_bounded(&mut *self.cycles.lock().await, outcome, self.capacity);
        Ok(())
    }

    pub async fn record_skipped_tick(&self) {
        self.metrics.lock().await.skipped_ticks += 1;
    }

    pub async fn snapshot_events(&self) -> Vec<ProctorEvent> {
        self.events.lock().await.iter().cloned().collect()
    }

    pub async fn snapshot_cycles(&self) -> Vec<CycleOutcome> {
        self.cycles.lock().await.iter().cloned().collect()
    }

    pub async fn metrics(&self) -> CaptureMetrics {
        self.metrics.lock().await.clone()
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if buffer.len() == capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proctorcam_types::telemetry::{CycleResult, CycleState};

    fn outcome(sequence: u64, result: CycleResult) -> CycleOutcome {
        CycleOutcome {
            sequence,
            key: None,
            result,
            final_state: CycleState::Idle,
            black_pixel_pct: None,
            started_at: Utc::now(),
            duration_ms: 1,
        }
    }

    #[tokio::test]
    async fn metrics_follow_recorded_cycles() {
        let store = TelemetryStore::new();
        store
            .record_cycle(outcome(
                1,
                CycleResult::Success {
                    url: "s3://b/m/k".into(),
                    bytes: 120,
                },
            ))
            .await
            .expect("record");
        store
            .record_cycle(outcome(
                2,
                CycleResult::Failed {
                    reason: "dark".into(),
                },
            ))
            .await
            .expect("record");
        store.record_cycle(outcome(3, CycleResult::Skipped)).await.expect("record");
        store.record_skipped_tick().await;

        let metrics = store.metrics().await;
        assert_eq!(metrics.cycles, 3);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.skipped_cycles, 1);
        assert_eq!(metrics.skipped_ticks, 1);
        assert_eq!(metrics.uploaded_bytes, 120);
        assert_eq!(store.snapshot_cycles().await.len(), 3);
    }

    #[tokio::test]
    async fn only_recent_cycles_are_retained() {
        let store = TelemetryStore::with_capacity(2);
        for sequence in 1..=3 {
            store
                .record_cycle(outcome(sequence, CycleResult::Skipped))
                .await
                .expect("record");
        }

        let kept: Vec<u64> = store
            .snapshot_cycles()
            .await
            .iter()
            .map(|c| c.sequence)
            .collect();
        assert_eq!(kept, vec![2, 3]);
        assert_eq!(store.metrics().await.cycles, 3);
    }
}
