//! The periodic snapshot capture loop.

use chrono::Utc;
use proctorcam_camera::{CameraSession, CameraSource};
use proctorcam_ops::{DeviceSignal, DeviceStatusTracker, TelemetryStore};
use proctorcam_reporting::EventReporter;
use proctorcam_storage::ObjectStore;
use proctorcam_types::{
    config::CaptureConfig,
    events::{EventName, ExtraData, SessionContext},
    snapshot::{SnapshotKey, SnapshotKeyGenerator},
    telemetry::{CycleOutcome, CycleResult, CycleState},
    Result,
};
use proctorcam_vision::{check_darkness, SnapshotEncoder};
use tokio::{
    sync::mpsc,
    time::{interval_at, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where uploaded snapshots are addressed in telemetry.
#[derive(Debug, Clone)]
pub struct StorageTarget {
    pub bucket: String,
    pub mode: String,
    pub prefix: String,
}

/// Progress of one cycle, kept so failures can still be attributed.
struct CycleTrace {
    state: CycleState,
    key: Option<SnapshotKey>,
    black_pixel_pct: Option<f64>,
}

impl CycleTrace {
    fn new() -> Self {
        Self {
            state: CycleState::Idle,
            key: None,
            black_pixel_pct: None,
        }
    }

    fn enter(&mut self, next: CycleState) {
        debug!("cycle {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

enum Sampled {
    Uploaded { url: String, bytes: usize },
    NoFrame,
}

pub struct CaptureLoop<E, S, R>
where
    E: SnapshotEncoder,
    S: ObjectStore,
    R: EventReporter,
{
    config: CaptureConfig,
    target: StorageTarget,
    session: SessionContext,
    keys: SnapshotKeyGenerator,
    encoder: E,
    store: S,
    reporter: R,
    telemetry: TelemetryStore,
    sequence: u64,
}

impl<E, S, R> CaptureLoop<E, S, R>
where
    E: SnapshotEncoder,
    S: ObjectStore,
    R: EventReporter,
{
    pub fn new(
        config: CaptureConfig,
        target: StorageTarget,
        session: SessionContext,
        encoder: E,
        store: S,
        reporter: R,
        telemetry: TelemetryStore,
    ) -> Self {
        let keys = SnapshotKeyGenerator::new(target.prefix.clone(), session.test_session_id.clone());
        Self {
            config,
            target,
            session,
            keys,
            encoder,
            store,
            reporter,
            telemetry,
            sequence: 0,
        }
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Run one capture cycle. Never fails: every error ends in a
    /// `snapshot_failed` report.
    pub async fn run_cycle<C: CameraSource>(
        &mut self,
        camera: &mut CameraSession<C>,
    ) -> CycleOutcome {
        self.sequence += 1;
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut trace = CycleTrace::new();

        let result = match self.execute(camera, &mut trace).await {
            Ok(Sampled::NoFrame) => {
                trace.enter(CycleState::Idle);
                CycleResult::Skipped
            }
            Ok(Sampled::Uploaded { url, bytes }) => {
                self.publish(EventName::SnapshotSuccess, Some(ExtraData::new(url.clone())))
                    .await;
                trace.enter(CycleState::ReportedSuccess);
                info!(
                    "Snapshot {} uploaded ({:.2} MB)",
                    self.sequence,
                    bytes as f64 / (1024.0 * 1024.0)
                );
                CycleResult::Success { url, bytes }
            }
            Err(err) => {
                warn!("Snapshot {} failed: {err}", self.sequence);
                self.publish(EventName::SnapshotFailed, None).await;
                trace.enter(CycleState::ReportedFailure);
                CycleResult::Failed {
                    reason: err.to_string(),
                }
            }
        };

        let outcome = CycleOutcome {
            sequence: self.sequence,
            key: trace.key.as_ref().map(SnapshotKey::as_path),
            result,
            final_state: trace.state,
            black_pixel_pct: trace.black_pixel_pct,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        if let Err(err) = self.telemetry.record_cycle(outcome.clone()).await {
            warn!("Failed to record cycle telemetry: {err}");
        }
        outcome
    }

    async fn execute<C: CameraSource>(
        &mut self,
        camera: &mut CameraSession<C>,
        trace: &mut CycleTrace,
    ) -> Result<Sampled> {
        trace.enter(CycleState::Sampling);
        let Some(frame) = camera.sample().await? else {
            return Ok(Sampled::NoFrame);
        };

        trace.enter(CycleState::Validating);
        match check_darkness(&frame, self.config.darkness_threshold_pct) {
            Ok(pct) => trace.black_pixel_pct = Some(pct),
            Err(err) => {
                trace.enter(CycleState::Rejected);
                return Err(err);
            }
        }

        trace.enter(CycleState::Encoding);
        let snapshot = self.encoder.encode(frame).await?;

        trace.enter(CycleState::Uploading);
        let key = self.keys.next_key();
        trace.key = Some(key.clone());
        let stored = self
            .store
            .put_object(
                &key,
                snapshot.content_type,
                snapshot.bytes,
                &self.session.token,
            )
            .await?;

        Ok(Sampled::Uploaded {
            url: key.storage_url(&self.target.bucket, &self.target.mode),
            bytes: stored.size,
        })
    }

    /// Report an event; reporting failures are logged and swallowed.
    pub async fn publish(&self, name: EventName, extra_data: Option<ExtraData>) {
        let event = self.session.event(name, extra_data);
        let cloned = event.clone();
        match self.reporter.report(event).await {
            Ok(()) => {
                if let Err(err) = self.telemetry.record_event(cloned).await {
                    warn!("Failed to record event telemetry: {err}");
                }
            }
            Err(err) => warn!("Failed to report {name}: {err}"),
        }
    }

    /// Drive cycles every `frequency_ms` until `cancel` fires.
    ///
    /// The first cycle runs one period after start and later cycles stay on
    /// that grid. A cycle runs to completion before the next tick is taken;
    /// grid ticks that fall inside it are counted as skipped and the next
    /// cycle waits for the following grid point. Device signals are reported
    /// between cycles.
    pub async fn run<C: CameraSource>(
        &mut self,
        camera: &mut CameraSession<C>,
        cancel: CancellationToken,
        mut signals: Option<mpsc::Receiver<DeviceSignal>>,
        mut device: DeviceStatusTracker,
    ) -> Result<()> {
        let period = Duration::from_millis(self.config.frequency_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Capture loop started (every {}ms)", self.config.frequency_ms);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                scheduled = ticker.tick() => {
                    self.run_cycle(camera).await;
                    let missed = overrun_ticks(scheduled.elapsed(), period);
                    if missed > 0 {
                        warn!("Cycle overran {} tick(s); skipping them", missed);
                        for _ in 0..missed {
                            self.telemetry.record_skipped_tick().await;
                        }
                        ticker.reset_at(scheduled + period.saturating_mul(missed.saturating_add(1)));
                    }
                }
                Some(signal) = next_signal(&mut signals) => {
                    if let Some((name, data)) = device.observe(signal) {
                        self.publish(name, data).await;
                    }
                }
            }
        }

        info!("Capture loop stopped after {} cycle(s)", self.sequence);
        Ok(())
    }
}

/// Grid ticks that elapsed while a cycle started at its tick was running.
fn overrun_ticks(elapsed: Duration, period: Duration) -> u32 {
    let ticks = elapsed.as_nanos() / period.as_nanos().max(1);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

async fn next_signal(signals: &mut Option<mpsc::Receiver<DeviceSignal>>) -> Option<DeviceSignal> {
    match signals {
        Some(rx) => match rx.recv().await {
            Some(signal) => Some(signal),
            None => {
                *signals = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}
