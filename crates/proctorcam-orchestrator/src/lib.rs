//! High-level orchestrator coordinating camera, setup and the capture loop.

use futures::stream::BoxStream;
use proctorcam_camera::{CameraSession, CameraSource};
use proctorcam_ops::{DeviceSignal, DeviceStatusTracker, TelemetryStore};
use proctorcam_reporting::EventReporter;
use proctorcam_storage::ObjectStore;
use proctorcam_types::{
    config::ProctorcamConfig,
    events::{ProctorEvent, SessionContext},
    telemetry::CaptureMetrics,
    ProctorError, Result,
};
use proctorcam_vision::JpegSnapshotEncoder;
use tokio::{sync::mpsc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod capture;
pub mod setup;

pub use capture::{CaptureLoop, StorageTarget};
pub use setup::{confirm_setup, SETUP_JPEG_QUALITY};

const WARMUP_ATTEMPTS: u32 = 20;
const WARMUP_INTERVAL: Duration = Duration::from_millis(100);

/// Owns one proctoring session. Snapshot size and quality come from
/// `config.capture`.
pub struct Orchestrator<C, S, R>
where
    C: CameraSource,
    S: ObjectStore + Clone,
    R: EventReporter + Clone,
{
    config: ProctorcamConfig,
    camera: CameraSession<C>,
    encoder: JpegSnapshotEncoder,
    store: S,
    reporter: R,
    telemetry: TelemetryStore,
    session: SessionContext,
    confirmed: bool,
}

impl<C, S, R> Orchestrator<C, S, R>
where
    C: CameraSource,
    S: ObjectStore + Clone,
    R: EventReporter + Clone,
{
    pub fn new(
        config: ProctorcamConfig,
        source: C,
        store: S,
        reporter: R,
        telemetry: TelemetryStore,
    ) -> Self {
        let camera = CameraSession::new(
            source,
            config.camera.facing_mode,
            Duration::from_millis(config.camera.release_delay_ms),
        );
        let session = SessionContext::from(&config.session);
        let encoder = JpegSnapshotEncoder::from_config(&config.capture);
        Self {
            config,
            camera,
            encoder,
            store,
            reporter,
            telemetry,
            session,
            confirmed: false,
        }
    }

    /// Validate configuration, acquire the camera and wait for its first frame.
    pub async fn boot(&mut self) -> Result<()> {
        self.config.validate()?;
        self.camera.start().await?;
        if !self
            .camera
            .wait_until_streaming(WARMUP_ATTEMPTS, WARMUP_INTERVAL)
            .await
        {
            warn!("Camera produced no frame data during warm-up");
        }
        info!(
            "Orchestrator booted for test {} session {}",
            self.session.test_id, self.session.test_session_id
        );
        Ok(())
    }

    pub async fn confirm_setup(&mut self) -> Result<()> {
        let session = confirm_setup(&mut self.camera, &self.reporter, self.session.clone()).await?;
        self.session = session;
        self.confirmed = true;
        Ok(())
    }

    /// Run the capture loop until `cancel` fires. Requires a confirmed setup.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
        signals: Option<mpsc::Receiver<DeviceSignal>>,
    ) -> Result<CaptureMetrics> {
        if !self.confirmed {
            return Err(orchestrator_error(
                "setup must be confirmed before capture starts",
            ));
        }
        let storage = &self.config.storage;
        let target = StorageTarget {
            bucket: storage.bucket.clone(),
            mode: storage.mode.clone(),
            prefix: storage.snapshot_prefix.clone(),
        };
        let mut capture = CaptureLoop::new(
            self.config.capture.clone(),
            target,
            self.session.clone(),
            self.encoder.clone(),
            self.store.clone(),
            self.reporter.clone(),
            self.telemetry.clone(),
        );
        let tracker = DeviceStatusTracker::new(self.config.ops.battery_low_threshold);
        capture
            .run(&mut self.camera, cancel, signals, tracker)
            .await?;
        Ok(self.telemetry.metrics().await)
    }

    /// Release the camera and log the session totals.
    pub async fn shutdown(&mut self) -> Result<CaptureMetrics> {
        self.camera.stop().await?;
        let metrics = self.telemetry.metrics().await;
        info!(
            "Shutdown: {} cycle(s), {} uploaded, {} failed, {} skipped tick(s)",
            metrics.cycles, metrics.successes, metrics.failures, metrics.skipped_ticks
        );
        Ok(metrics)
    }

    pub fn events(&self) -> BoxStream<'static, ProctorEvent> {
        self.reporter.subscribe()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Unknown(format!("orchestrator: {}", message.into()))
}
