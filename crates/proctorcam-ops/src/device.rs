//! Battery and screen-state transition tracking.

use proctorcam_types::{
    events::{EventName, ExtraData},
    ProctorError, Result,
};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Decoded device status update delivered by the host platform.
///
/// One JSON object per line, e.g. `{"battery":{"level":0.15,"charging":false}}`
/// or `{"visibility":"hidden"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSignal {
    /// `level` is a fraction in `[0, 1]`.
    Battery { level: f32, charging: bool },
    Visibility(Visibility),
}

impl DeviceSignal {
    pub fn parse_line(line: &str) -> Result<Self> {
        serde_json::from_str(line)
            .map_err(|err| ProctorError::Ops(format!("invalid device signal {line:?}: {err}")))
    }
}

/// Forward newline-delimited signals from `reader` until it ends or the
/// receiver goes away. Malformed lines are logged and dropped.
pub async fn forward_signals<R>(reader: R, tx: mpsc::Sender<DeviceSignal>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| ProctorError::Ops(format!("device signal read failed: {err}")))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match DeviceSignal::parse_line(line) {
            Ok(signal) => {
                if tx.send(signal).await.is_err() {
                    debug!("Device signal receiver closed");
                    break;
                }
            }
            Err(err) => warn!("{err}"),
        }
    }
    Ok(())
}

/// Emits `battery_low` / `battery_ok` once per transition.
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    threshold: f32,
    low_reported: bool,
    normal_reported: bool,
}

impl BatteryMonitor {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            low_reported: false,
            normal_reported: false,
        }
    }

    pub fn observe(&mut self, level: f32, charging: bool) -> Option<(EventName, ExtraData)> {
        let is_low = level <= self.threshold && !charging;
        let value = ExtraData::new(battery_percent(level));
        if is_low && !self.low_reported {
            self.low_reported = true;
            self.normal_reported = false;
            Some((EventName::BatteryLow, value))
        } else if !is_low && !self.normal_reported {
            self.normal_reported = true;
            self.low_reported = false;
            Some((EventName::BatteryOk, value))
        } else {
            None
        }
    }
}

fn battery_percent(level: f32) -> f64 {
    (f64::from(level.clamp(0.0, 1.0)) * 100.0).round()
}

/// Emits `screen_on` / `screen_off` on visibility changes only.
#[derive(Debug, Clone)]
pub struct ScreenMonitor {
    last: Visibility,
}

impl Default for ScreenMonitor {
    fn default() -> Self {
        Self {
            last: Visibility::Visible,
        }
    }
}

impl ScreenMonitor {
    pub fn observe(&mut self, visibility: Visibility) -> Option<EventName> {
        if visibility == self.last {
            return None;
        }
        self.last = visibility;
        Some(match visibility {
            Visibility::Visible => EventName::ScreenOn,
            Visibility::Hidden => EventName::ScreenOff,
        })
    }
}

/// Routes device signals to the matching monitor.
#[derive(Debug, Clone)]
pub struct DeviceStatusTracker {
    battery: BatteryMonitor,
    screen: ScreenMonitor,
}

impl DeviceStatusTracker {
    pub fn new(battery_low_threshold: f32) -> Self {
        Self {
            battery: BatteryMonitor::new(battery_low_threshold),
            screen: ScreenMonitor::default(),
        }
    }

    pub fn observe(&mut self, signal: DeviceSignal) -> Option<(EventName, Option<ExtraData>)> {
        match signal {
            DeviceSignal::Battery { level, charging } => self
                .battery
                .observe(level, charging)
                .map(|(name, data)| (name, Some(data))),
            DeviceSignal::Visibility(visibility) => {
                self.screen.observe(visibility).map(|name| (name, None))
            }
        }
    }
}
