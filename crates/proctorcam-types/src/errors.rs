use thiserror::Error;

pub type Result<T, E = ProctorError> = std::result::Result<T, E>;

/// Unified error type covering camera, capture, storage and reporting failures.
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("camera busy: {0}")]
    DeviceBusy(String),
    #[error("camera access restricted: {0}")]
    SecurityRestricted(String),
    #[error("image too dark: {percentage:.1}% black pixels (threshold {threshold:.1}%)")]
    ImageTooDark { percentage: f64, threshold: f64 },
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("reporting error: {0}")]
    Reporting(String),
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("compatibility check failed: {0}")]
    CompatibilityCheckFailed(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("unknown error: {0}")]
    Unknown(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProctorError {
    /// True for the camera acquisition family of failures.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            ProctorError::PermissionDenied(_)
                | ProctorError::DeviceNotFound(_)
                | ProctorError::DeviceBusy(_)
                | ProctorError::SecurityRestricted(_)
        )
    }

    /// Short message suitable for a transient on-screen notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProctorError::PermissionDenied(_) => {
                "Camera permission denied. Please enable camera access in your settings."
            }
            ProctorError::DeviceNotFound(_) => "No camera found on your device.",
            ProctorError::DeviceBusy(_) => "Camera is in use by another application.",
            ProctorError::SecurityRestricted(_) => {
                "Camera access is restricted. Please ensure you are using HTTPS."
            }
            ProctorError::ImageTooDark { .. } => {
                "Image too dark. Please ensure that the lighting is good"
            }
            ProctorError::NotStreaming => "Please ensure that your camera is working",
            ProctorError::CompatibilityCheckFailed(_) => {
                "Device orientation check failed. Please adjust your camera."
            }
            _ => "Something went wrong. Please try again",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_family() {
        assert!(ProctorError::DeviceBusy("cam0".into()).is_acquisition());
        assert!(ProctorError::SecurityRestricted("http".into()).is_acquisition());
        assert!(!ProctorError::NotStreaming.is_acquisition());
        assert!(!ProctorError::UploadFailed("503".into()).is_acquisition());
    }

    #[test]
    fn too_dark_message_carries_numbers() {
        let err = ProctorError::ImageTooDark {
            percentage: 91.25,
            threshold: 80.0,
        };
        let text = err.to_string();
        assert!(text.contains("91.2") || text.contains("91.3"));
        assert!(text.contains("80.0"));
        assert!(err.user_message().starts_with("Image too dark"));
    }
}
