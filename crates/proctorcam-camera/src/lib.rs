//! Camera acquisition abstraction and the session owning the active stream.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use proctorcam_types::{config::FacingMode, frame::Frame, ProctorError, Result};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

mod still;

pub use still::StillImageCamera;

/// Acquisition failure classes reported by camera back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionFailure {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    SecurityRestricted,
    Unknown,
}

impl AcquisitionFailure {
    /// Map a media-device error name (`NotAllowedError`, ...) onto a failure class.
    pub fn from_error_name(name: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" => AcquisitionFailure::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => {
                AcquisitionFailure::DeviceNotFound
            }
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                AcquisitionFailure::DeviceBusy
            }
            "SecurityError" => AcquisitionFailure::SecurityRestricted,
            _ => AcquisitionFailure::Unknown,
        }
    }

    pub fn into_error(self, detail: impl Into<String>) -> ProctorError {
        let detail = detail.into();
        match self {
            AcquisitionFailure::PermissionDenied => ProctorError::PermissionDenied(detail),
            AcquisitionFailure::DeviceNotFound => ProctorError::DeviceNotFound(detail),
            AcquisitionFailure::DeviceBusy => ProctorError::DeviceBusy(detail),
            AcquisitionFailure::SecurityRestricted => ProctorError::SecurityRestricted(detail),
            AcquisitionFailure::Unknown => ProctorError::Unknown(detail),
        }
    }
}

/// Description of a live stream handed out by `acquire`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: u64,
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
}

/// Aggregated camera counters.
#[derive(Debug, Default, Clone)]
pub struct CameraMetrics {
    pub acquisitions: u64,
    pub failed_acquisitions: u64,
    pub frames_read: u64,
    pub empty_frames: u64,
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn acquire(&mut self, facing_mode: FacingMode) -> Result<StreamInfo>;
    /// Current frame at native resolution; empty until the stream delivers data.
    async fn read_frame(&self) -> Result<Frame>;
    async fn stop(&mut self) -> Result<()>;
    fn is_active(&self) -> bool;
    fn metrics(&self) -> CameraMetrics;
}

/// Picture produced by the synthetic camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Solid([u8; 3]),
    /// Horizontal luminance ramp from black to white.
    Gradient,
    /// Top `black_rows` rows are black, the rest white.
    Letterbox { black_rows: u32 },
}

impl Pattern {
    pub fn render(self, width: u32, height: u32) -> Frame {
        match self {
            Pattern::Solid(rgb) => Frame::solid(width, height, rgb),
            Pattern::Gradient => {
                let mut data = Vec::with_capacity((width * height * 4) as usize);
                for _ in 0..height {
                    for x in 0..width {
                        let v = if width > 1 {
                            (x * 255 / (width - 1)) as u8
                        } else {
                            255
                        };
                        data.extend_from_slice(&[v, v, v, 255]);
                    }
                }
                Frame::from_rgba(width, height, data)
            }
            Pattern::Letterbox { black_rows } => {
                let mut data = Vec::with_capacity((width * height * 4) as usize);
                for y in 0..height {
                    let v = if y < black_rows { 0 } else { 255 };
                    for _ in 0..width {
                        data.extend_from_slice(&[v, v, v, 255]);
                    }
                }
                Frame::from_rgba(width, height, data)
            }
        }
    }
}

#[derive(Debug)]
struct SyntheticState {
    pattern: Pattern,
    fail_next: Option<AcquisitionFailure>,
    warmup_reads: u32,
    active: Option<StreamInfo>,
    next_id: u64,
    metrics: CameraMetrics,
}

/// Camera that renders frames from a pattern; used for demos and tests.
///
/// Clones share state, so a test can keep a handle and change the picture
/// while the capture loop owns the other clone.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(SyntheticState {
                pattern,
                fail_next: None,
                warmup_reads: 0,
                active: None,
                next_id: 1,
                metrics: CameraMetrics::default(),
            })),
        }
    }

    /// Number of reads after each acquisition that return an empty frame.
    pub fn with_warmup(self, reads: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.warmup_reads = reads;
        }
        self
    }

    pub fn set_pattern(&self, pattern: Pattern) {
        if let Ok(mut state) = self.state.lock() {
            state.pattern = pattern;
        }
    }

    /// Make the next `acquire` fail with the given class.
    pub fn fail_next_acquire(&self, failure: AcquisitionFailure) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(failure);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SyntheticState>> {
        self.state
            .lock()
            .map_err(|_| camera_error("synthetic camera state poisoned"))
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    async fn acquire(&mut self, facing_mode: FacingMode) -> Result<StreamInfo> {
        info!("Acquiring synthetic camera ({:?})", facing_mode);
        let mut state = self.lock()?;
        if let Some(failure) = state.fail_next.take() {
            state.metrics.failed_acquisitions += 1;
            return Err(failure.into_error("synthetic camera refused acquisition"));
        }
        if state.active.is_some() {
            state.metrics.failed_acquisitions += 1;
            return Err(ProctorError::DeviceBusy(
                "synthetic camera already streaming".into(),
            ));
        }
        let info = StreamInfo {
            id: state.next_id,
            facing_mode,
            width: self.width,
            height: self.height,
        };
        state.next_id += 1;
        state.active = Some(info.clone());
        state.metrics.acquisitions += 1;
        Ok(info)
    }

    async fn read_frame(&self) -> Result<Frame> {
        let mut state = self.lock()?;
        if state.active.is_none() {
            return Err(camera_error("no active stream"));
        }
        state.metrics.frames_read += 1;
        if state.warmup_reads > 0 {
            state.warmup_reads -= 1;
            state.metrics.empty_frames += 1;
            return Ok(Frame::empty());
        }
        let mut frame = state.pattern.render(self.width, self.height);
        frame.captured_at = Utc::now();
        Ok(frame)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(info) = state.active.take() {
            debug!("Stopped synthetic stream {}", info.id);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.active.is_some())
            .unwrap_or(false)
    }

    fn metrics(&self) -> CameraMetrics {
        self.state
            .lock()
            .map(|s| s.metrics.clone())
            .unwrap_or_default()
    }
}

/// Owns the single active stream and its lifecycle.
pub struct CameraSession<C: CameraSource> {
    source: C,
    facing_mode: FacingMode,
    release_delay: Duration,
    stream: Option<StreamInfo>,
    streaming: bool,
}

impl<C: CameraSource> CameraSession<C> {
    pub fn new(source: C, facing_mode: FacingMode, release_delay: Duration) -> Self {
        Self {
            source,
            facing_mode,
            release_delay,
            stream: None,
            streaming: false,
        }
    }

    /// Request a stream. Acquisition failures are logged with their user-facing
    /// message and returned; no automatic retry happens.
    pub async fn start(&mut self) -> Result<StreamInfo> {
        match self.source.acquire(self.facing_mode).await {
            Ok(info) => {
                info!(
                    "Camera stream {} acquired ({}x{})",
                    info.id, info.width, info.height
                );
                self.stream = Some(info.clone());
                self.streaming = false;
                Ok(info)
            }
            Err(err) => {
                warn!("{} ({err})", err.user_message());
                Err(err)
            }
        }
    }

    /// Stop the current stream, give the device time to release the hardware,
    /// then request a new one.
    pub async fn restart(&mut self) -> Result<StreamInfo> {
        if self.stream.is_some() {
            self.stop().await?;
            debug!(
                "Waiting {}ms for camera hardware release",
                self.release_delay.as_millis()
            );
            sleep(self.release_delay).await;
        }
        self.start().await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.source.stop().await?;
        self.stream = None;
        self.streaming = false;
        Ok(())
    }

    /// Read the current frame. `None` when there is no active stream or the
    /// stream has not delivered data yet.
    pub async fn sample(&mut self) -> Result<Option<Frame>> {
        if self.stream.is_none() || !self.source.is_active() {
            return Ok(None);
        }
        let frame = self.source.read_frame().await?;
        if !frame.has_data() {
            debug!("Camera has no frame data yet; skipping");
            return Ok(None);
        }
        if !self.streaming {
            info!("Camera metadata loaded; streaming");
            self.streaming = true;
        }
        Ok(Some(frame))
    }

    /// Poll until the first frame with data arrives or `attempts` run out.
    pub async fn wait_until_streaming(&mut self, attempts: u32, interval: Duration) -> bool {
        for _ in 0..attempts {
            match self.sample().await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(err) => warn!("Camera read failed while warming up: {err}"),
            }
            sleep(interval).await;
        }
        self.streaming
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn stream(&self) -> Option<&StreamInfo> {
        self.stream.as_ref()
    }

    pub fn metrics(&self) -> CameraMetrics {
        self.source.metrics()
    }
}

/// Generate an error aligned with camera semantics.
pub fn camera_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Unknown(format!("camera: {}", message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names_map_to_taxonomy() {
        assert_eq!(
            AcquisitionFailure::from_error_name("NotAllowedError"),
            AcquisitionFailure::PermissionDenied
        );
        assert_eq!(
            AcquisitionFailure::from_error_name("NotReadableError"),
            AcquisitionFailure::DeviceBusy
        );
        assert_eq!(
            AcquisitionFailure::from_error_name("SecurityError"),
            AcquisitionFailure::SecurityRestricted
        );
        assert_eq!(
            AcquisitionFailure::from_error_name("Whatever"),
            AcquisitionFailure::Unknown
        );
        assert!(matches!(
            AcquisitionFailure::DeviceNotFound.into_error("x"),
            ProctorError::DeviceNotFound(_)
        ));
    }

    #[test]
    fn letterbox_pattern_rows() {
        let frame = Pattern::Letterbox { black_rows: 1 }.render(2, 2);
        assert_eq!(&frame.data[0..4], &[0, 0, 0, 255]);
        assert_eq!(&frame.data[8..12], &[255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn session_skips_frames_before_metadata() {
        let camera = SyntheticCamera::new(4, 4, Pattern::Solid([200, 200, 200])).with_warmup(2);
        let mut session = CameraSession::new(camera, FacingMode::User, Duration::from_millis(0));

        assert!(session.sample().await.expect("sample").is_none());
        session.start().await.expect("start");
        assert!(session.sample().await.expect("sample").is_none());
        assert!(session.sample().await.expect("sample").is_none());
        assert!(!session.is_streaming());
        let frame = session.sample().await.expect("sample").expect("frame");
        assert_eq!((frame.width, frame.height), (4, 4));
        assert!(session.is_streaming());
    }

    #[tokio::test]
    async fn acquisition_failure_surfaces_without_retry() {
        let camera = SyntheticCamera::new(4, 4, Pattern::Gradient);
        camera.fail_next_acquire(AcquisitionFailure::PermissionDenied);
        let handle = camera.clone();
        let mut session = CameraSession::new(camera, FacingMode::User, Duration::from_millis(0));

        let err = session.start().await.expect_err("denied");
        assert!(matches!(err, ProctorError::PermissionDenied(_)));
        assert_eq!(handle.metrics().failed_acquisitions, 1);
        assert_eq!(handle.metrics().acquisitions, 0);
        assert!(session.stream().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_waits_for_hardware_release() {
        let camera = SyntheticCamera::new(4, 4, Pattern::Gradient);
        let mut session = CameraSession::new(camera, FacingMode::User, Duration::from_millis(2_000));
        let first = session.start().await.expect("start");

        let begun = tokio::time::Instant::now();
        let second = session.restart().await.expect("restart");
        assert!(begun.elapsed() >= Duration::from_millis(2_000));
        assert_ne!(first.id, second.id);
    }
}
