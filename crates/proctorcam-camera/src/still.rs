use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use proctorcam_types::{config::FacingMode, frame::Frame, ProctorError, Result};
use tracing::{debug, info};

use crate::{camera_error, CameraMetrics, CameraSource, StreamInfo};

/// Camera that serves one decoded image file as its live feed.
///
/// The file is re-read on every acquisition so it can be swapped on disk
/// between restarts.
pub struct StillImageCamera {
    path: PathBuf,
    current: Option<(StreamInfo, Frame)>,
    next_id: u64,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
            next_id: 1,
            metrics: Arc::new(Mutex::new(CameraMetrics::default())),
        }
    }

    async fn load(&self) -> Result<Frame> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            let detail = format!("{}: {err}", self.path.display());
            match err.kind() {
                ErrorKind::NotFound => ProctorError::DeviceNotFound(detail),
                ErrorKind::PermissionDenied => ProctorError::PermissionDenied(detail),
                _ => ProctorError::Unknown(detail),
            }
        })?;
        let img = image::load_from_memory(&raw)
            .map_err(|err| camera_error(format!("failed to decode still image: {err}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Frame::from_rgba(width, height, rgba.into_raw()))
    }

    fn record(&self, update: impl FnOnce(&mut CameraMetrics)) {
        if let Ok(mut guard) = self.metrics.lock() {
            update(&mut guard);
        }
    }
}

#[async_trait]
impl CameraSource for StillImageCamera {
    async fn acquire(&mut self, facing_mode: FacingMode) -> Result<StreamInfo> {
        if self.current.is_some() {
            self.record(|m| m.failed_acquisitions += 1);
            return Err(ProctorError::DeviceBusy(format!(
                "{} already streaming",
                self.path.display()
            )));
        }
        let frame = match self.load().await {
            Ok(frame) => frame,
            Err(err) => {
                self.record(|m| m.failed_acquisitions += 1);
                return Err(err);
            }
        };
        let info = StreamInfo {
            id: self.next_id,
            facing_mode,
            width: frame.width,
            height: frame.height,
        };
        self.next_id += 1;
        info!(
            "Still image camera streaming {} ({}x{})",
            self.path.display(),
            info.width,
            info.height
        );
        self.current = Some((info.clone(), frame));
        self.record(|m| m.acquisitions += 1);
        Ok(info)
    }

    async fn read_frame(&self) -> Result<Frame> {
        let Some((_, frame)) = &self.current else {
            return Err(camera_error("no active stream"));
        };
        self.record(|m| m.frames_read += 1);
        let mut frame = frame.clone();
        frame.captured_at = Utc::now();
        Ok(frame)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some((info, _)) = self.current.take() {
            debug!("Stopped still image stream {}", info.id);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.current.is_some()
    }

    fn metrics(&self) -> CameraMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}
