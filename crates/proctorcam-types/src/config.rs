use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{snapshot::DEFAULT_SNAPSHOT_PREFIX, ProctorError, Result};

/// Identity of the monitored test session, supplied by the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub test_id: String,
    pub test_session_id: String,
    pub token: String,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

/// Which physical camera the stream is requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub facing_mode: FacingMode,
    /// Wait between stopping a stream and requesting a new one.
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,
    /// Serve frames from this image instead of a synthetic pattern.
    #[serde(default)]
    pub still_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_target_height")]
    pub target_height: u32,
    #[serde(default = "default_darkness_threshold_pct")]
    pub darkness_threshold_pct: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Http,
    LocalDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub region: String,
    pub bucket: String,
    /// Deployment mode segment of the canonical snapshot URL.
    pub mode: String,
    /// Upload endpoint for the HTTP backend, root directory for `local_dir`.
    pub endpoint: String,
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    /// Battery fraction at or below which a discharging device is "low".
    #[serde(default = "default_battery_low_threshold")]
    pub battery_low_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorcamConfig {
    pub session: SessionConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub reporting: ReportingConfig,
    pub ops: OpsConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frequency_ms: default_frequency_ms(),
            target_width: default_target_width(),
            target_height: default_target_height(),
            darkness_threshold_pct: default_darkness_threshold_pct(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
            release_delay_ms: default_release_delay_ms(),
            still_image: None,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frequency_ms == 0 {
            return Err(ProctorError::Configuration(
                "capture.frequency_ms must be greater than zero".into(),
            ));
        }
        if self.target_width == 0 || self.target_height == 0 {
            return Err(ProctorError::Configuration(
                "capture.target_width and capture.target_height must be greater than zero".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.darkness_threshold_pct) {
            return Err(ProctorError::Configuration(
                "capture.darkness_threshold_pct must be between 0 and 100".into(),
            ));
        }
        if !(self.jpeg_quality > 0.0 && self.jpeg_quality <= 1.0) {
            return Err(ProctorError::Configuration(
                "capture.jpeg_quality must be in (0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

impl ProctorcamConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ProctorError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ProctorError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.test_id.is_empty() || self.session.test_session_id.is_empty() {
            return Err(ProctorError::Configuration(
                "session.test_id and session.test_session_id are required".into(),
            ));
        }
        if self.session.token.is_empty() {
            return Err(ProctorError::Configuration(
                "session.token is required".into(),
            ));
        }
        self.capture.validate()?;
        if self.storage.bucket.is_empty() {
            return Err(ProctorError::Configuration(
                "storage.bucket is required".into(),
            ));
        }
        if self.storage.endpoint.is_empty() {
            return Err(ProctorError::Configuration(
                "storage.endpoint is required".into(),
            ));
        }
        if self.reporting.base_url.is_empty() {
            return Err(ProctorError::Configuration(
                "reporting.base_url is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ops.battery_low_threshold) {
            return Err(ProctorError::Configuration(
                "ops.battery_low_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn default_release_delay_ms() -> u64 {
    2_000
}

fn default_frequency_ms() -> u64 {
    3_000
}

fn default_target_width() -> u32 {
    640
}

fn default_target_height() -> u32 {
    480
}

fn default_darkness_threshold_pct() -> f64 {
    80.0
}

fn default_jpeg_quality() -> f32 {
    0.6
}

fn default_snapshot_prefix() -> String {
    DEFAULT_SNAPSHOT_PREFIX.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_battery_low_threshold() -> f32 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_config() -> ProctorcamConfig {
        ProctorcamConfig {
            session: SessionConfig {
                test_id: "12345".into(),
                test_session_id: "67890".into(),
                token: "token".into(),
                device_fingerprint: None,
            },
            camera: CameraConfig::default(),
            capture: CaptureConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::Http,
                region: "us-west-2".into(),
                bucket: "ib-assessment-tests".into(),
                mode: "staging".into(),
                endpoint: "https://storage.example.com".into(),
                snapshot_prefix: default_snapshot_prefix(),
            },
            reporting: ReportingConfig {
                base_url: "https://proctor.example.com".into(),
                request_timeout_ms: 5_000,
            },
            ops: OpsConfig {
                log_level: "debug".into(),
                battery_low_threshold: 0.2,
            },
        }
    }

    #[test]
    fn load_config_from_file() {
        let temp_path = std::env::temp_dir().join("proctorcam-config-test.toml");
        let mut config = sample_config();
        config.capture.frequency_ms = 1_500;
        config.camera.facing_mode = FacingMode::Environment;

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = ProctorcamConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.capture.frequency_ms, 1_500);
        assert_eq!(loaded.camera.facing_mode, FacingMode::Environment);
        assert_eq!(loaded.storage.bucket, config.storage.bucket);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn capture_defaults_fill_missing_keys() {
        let doc = r#"
            [session]
            test_id = "1"
            test_session_id = "2"
            token = "t"

            [camera]

            [capture]
            frequency_ms = 1000

            [storage]
            region = "us-west-2"
            bucket = "b"
            mode = "dev"
            endpoint = "snapshots"
            backend = "local_dir"

            [reporting]
            base_url = "http://localhost:3000"

            [ops]
            log_level = "info"
        "#;
        let config: ProctorcamConfig = toml::from_str(doc).expect("parse config");
        assert_eq!(config.capture.frequency_ms, 1000);
        assert_eq!(config.capture.target_width, 640);
        assert_eq!(config.capture.target_height, 480);
        assert_eq!(config.capture.darkness_threshold_pct, 80.0);
        assert_eq!(config.camera.release_delay_ms, 2_000);
        assert_eq!(config.storage.backend, StorageBackend::LocalDir);
        assert_eq!(config.storage.snapshot_prefix, DEFAULT_SNAPSHOT_PREFIX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = sample_config();
        assert!(config.validate().is_ok());

        config.capture.frequency_ms = 0;
        assert!(config.validate().is_err());
        config.capture.frequency_ms = 3_000;
        config.capture.target_height = 0;
        assert!(config.validate().is_err());
        config.capture.target_height = 480;
        config.capture.darkness_threshold_pct = 120.0;
        assert!(config.validate().is_err());
        config.capture.darkness_threshold_pct = 80.0;
        config.capture.jpeg_quality = 0.0;
        assert!(config.validate().is_err());
        config.capture.jpeg_quality = 0.6;
        config.session.token.clear();
        assert!(config.validate().is_err());
        config.session.token = "token".into();
        config.ops.battery_low_threshold = 1.5;
        assert!(config.validate().is_err());
        config.ops.battery_low_threshold = 0.2;
        assert!(config.validate().is_ok());
    }
}
