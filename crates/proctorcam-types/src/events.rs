use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Fixed set of proctoring event names understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    SetupSuccess,
    SetupFail,
    SnapshotSuccess,
    SnapshotFailed,
    BatteryLow,
    BatteryOk,
    ScreenOn,
    ScreenOff,
    #[serde(rename = "image_compatibility_fail")]
    ImageIncompatible,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::SetupSuccess => "setup_success",
            EventName::SetupFail => "setup_fail",
            EventName::SnapshotSuccess => "snapshot_success",
            EventName::SnapshotFailed => "snapshot_failed",
            EventName::BatteryLow => "battery_low",
            EventName::BatteryOk => "battery_ok",
            EventName::ScreenOn => "screen_on",
            EventName::ScreenOff => "screen_off",
            EventName::ImageIncompatible => "image_compatibility_fail",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to an event; `value` is a URL, a percentage or a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    pub value: serde_json::Value,
}

impl ExtraData {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Explicit replacement for the host page's global config store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub test_id: String,
    pub test_session_id: String,
    pub token: String,
    pub device_fingerprint: Option<String>,
}

impl SessionContext {
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }

    /// Build an event stamped with this session's identity.
    pub fn event(&self, name: EventName, extra_data: Option<ExtraData>) -> ProctorEvent {
        ProctorEvent {
            id: Uuid::new_v4(),
            name,
            test_id: self.test_id.clone(),
            device_fingerprint: self.device_fingerprint.clone(),
            token: self.token.clone(),
            extra_data,
            timestamp: Utc::now(),
        }
    }
}

impl From<&SessionConfig> for SessionContext {
    fn from(config: &SessionConfig) -> Self {
        Self {
            test_id: config.test_id.clone(),
            test_session_id: config.test_session_id.clone(),
            token: config.token.clone(),
            device_fingerprint: config.device_fingerprint.clone(),
        }
    }
}

/// Immutable proctoring telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorEvent {
    pub id: Uuid,
    pub name: EventName,
    pub test_id: String,
    pub device_fingerprint: Option<String>,
    pub token: String,
    pub extra_data: Option<ExtraData>,
    pub timestamp: DateTime<Utc>,
}
