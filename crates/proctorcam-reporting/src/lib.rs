//! Proctoring event reporting facade.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use proctorcam_types::{
    events::{EventName, ProctorEvent, SessionContext},
    ProctorError, Result,
};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

mod http;

pub use http::{HttpReporter, ReportBody, WireEvent};

#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn report(&self, event: ProctorEvent) -> Result<()>;
    /// Submit a setup image to the backend's orientation/compatibility check.
    async fn check_compatibility(&self, session: &SessionContext, image: Vec<u8>) -> Result<()>;
    /// Stream of events that were accepted by `report`.
    fn subscribe(&self) -> BoxStream<'static, ProctorEvent>;
}

#[async_trait]
impl<T: EventReporter + ?Sized> EventReporter for Arc<T> {
    async fn report(&self, event: ProctorEvent) -> Result<()> {
        (**self).report(event).await
    }

    async fn check_compatibility(&self, session: &SessionContext, image: Vec<u8>) -> Result<()> {
        (**self).check_compatibility(session, image).await
    }

    fn subscribe(&self) -> BoxStream<'static, ProctorEvent> {
        (**self).subscribe()
    }
}

/// In-process reporter that keeps every event; backs tests and dry runs.
#[derive(Clone)]
pub struct RecordingReporter {
    tx: broadcast::Sender<ProctorEvent>,
    events: Arc<Mutex<Vec<ProctorEvent>>>,
    fail_reports: Arc<AtomicBool>,
    compatible: Arc<AtomicBool>,
    compatibility_checks: Arc<Mutex<Vec<usize>>>,
}

impl RecordingReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            events: Arc::new(Mutex::new(Vec::new())),
            fail_reports: Arc::new(AtomicBool::new(false)),
            compatible: Arc::new(AtomicBool::new(true)),
            compatibility_checks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_reports.store(failing, Ordering::SeqCst);
    }

    pub fn set_compatible(&self, compatible: bool) {
        self.compatible.store(compatible, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<ProctorEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, name: EventName) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.name == name)
            .count()
    }

    /// Sizes of the images submitted for compatibility checks.
    pub async fn compatibility_checks(&self) -> Vec<usize> {
        self.compatibility_checks.lock().await.clone()
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventReporter for RecordingReporter {
    async fn report(&self, event: ProctorEvent) -> Result<()> {
        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(reporting_error(format!("simulated failure for {}", event.name)));
        }
        info!("Recorded proctor event {}", event.name);
        self.events.lock().await.push(event.clone());
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn check_compatibility(&self, _session: &SessionContext, image: Vec<u8>) -> Result<()> {
        self.compatibility_checks.lock().await.push(image.len());
        if self.compatible.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProctorError::CompatibilityCheckFailed(
                "device orientation rejected".into(),
            ))
        }
    }

    fn subscribe(&self) -> BoxStream<'static, ProctorEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn reporting_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Reporting(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctorcam_types::events::ExtraData;

    fn session() -> SessionContext {
        SessionContext {
            test_id: "12345".into(),
            test_session_id: "67890".into(),
            token: "tok".into(),
            device_fingerprint: Some("fp".into()),
        }
    }

    #[tokio::test]
    async fn recorded_events_reach_subscribers() {
        let reporter = RecordingReporter::new(8);
        let mut stream = reporter.subscribe();
        reporter
            .report(session().event(EventName::ScreenOff, None))
            .await
            .expect("report");
        reporter
            .report(session().event(EventName::BatteryOk, Some(ExtraData::new(80.0))))
            .await
            .expect("report");

        let first = stream.next().await.expect("first event");
        assert_eq!(first.name, EventName::ScreenOff);
        assert_eq!(reporter.count(EventName::BatteryOk).await, 1);
        assert_eq!(reporter.events().await.len(), 2);
    }

    #[tokio::test]
    async fn failing_reporter_keeps_nothing() {
        let reporter = RecordingReporter::default();
        reporter.set_failing(true);
        let err = reporter
            .report(session().event(EventName::SnapshotFailed, None))
            .await
            .expect_err("failing");
        assert!(matches!(err, ProctorError::Reporting(_)));
        assert!(reporter.events().await.is_empty());
    }

    #[tokio::test]
    async fn compatibility_verdict_is_configurable() {
        let reporter = RecordingReporter::default();
        assert!(reporter.check_compatibility(&session(), vec![0; 4]).await.is_ok());
        reporter.set_compatible(false);
        assert!(matches!(
            reporter.check_compatibility(&session(), vec![0; 2]).await,
            Err(ProctorError::CompatibilityCheckFailed(_))
        ));
        assert_eq!(reporter.compatibility_checks().await, vec![4, 2]);
    }
}
