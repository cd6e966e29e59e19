//! One-shot secondary camera setup confirmation.

use proctorcam_camera::{CameraSession, CameraSource};
use proctorcam_ops::device_fingerprint;
use proctorcam_reporting::EventReporter;
use proctorcam_types::{
    events::{EventName, ExtraData, ProctorEvent, SessionContext},
    ProctorError, Result,
};
use proctorcam_vision::{JpegSnapshotEncoder, SnapshotEncoder};
use tracing::{info, warn};

pub const SETUP_JPEG_QUALITY: f32 = 0.8;

/// Confirm the secondary camera with the backend.
///
/// Returns the session context carrying the device fingerprint that every
/// later event must include.
pub async fn confirm_setup<C, R>(
    camera: &mut CameraSession<C>,
    reporter: &R,
    session: SessionContext,
) -> Result<SessionContext>
where
    C: CameraSource,
    R: EventReporter + ?Sized,
{
    let frame = match camera.sample().await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            report_setup_fail(reporter, &session).await;
            return Err(ProctorError::NotStreaming);
        }
        Err(err) => {
            warn!("Camera read failed during setup: {err}");
            report_setup_fail(reporter, &session).await;
            return Err(ProctorError::NotStreaming);
        }
    };

    let encoder = JpegSnapshotEncoder::new(frame.width, frame.height, SETUP_JPEG_QUALITY);
    let image = match encoder.encode(frame).await {
        Ok(image) => image,
        Err(err) => {
            warn!("Setup image could not be encoded: {err}");
            report_setup_fail(reporter, &session).await;
            return Err(err);
        }
    };

    let fingerprint = session
        .device_fingerprint
        .clone()
        .unwrap_or_else(device_fingerprint);

    // Device is unregistered until this is accepted; fingerprint is payload only.
    reporter
        .report(unregistered_event(
            &session,
            EventName::SetupSuccess,
            Some(ExtraData::new(fingerprint.clone())),
        ))
        .await?;
    let session = session.with_fingerprint(fingerprint.clone());

    if let Err(err) = reporter.check_compatibility(&session, image.bytes).await {
        warn!("Setup image rejected: {err}");
        if let Err(report_err) = reporter
            .report(session.event(EventName::ImageIncompatible, None))
            .await
        {
            warn!("Failed to report image incompatibility: {report_err}");
        }
        return Err(ProctorError::CompatibilityCheckFailed(err.to_string()));
    }

    info!("Secondary camera setup confirmed for device {fingerprint}");
    Ok(session)
}

/// Event sent before the device is registered, so without a fingerprint.
fn unregistered_event(
    session: &SessionContext,
    name: EventName,
    extra_data: Option<ExtraData>,
) -> ProctorEvent {
    let mut event = session.event(name, extra_data);
    event.device_fingerprint = None;
    event
}

async fn report_setup_fail<R: EventReporter + ?Sized>(reporter: &R, session: &SessionContext) {
    let event = unregistered_event(session, EventName::SetupFail, None);
    if let Err(err) = reporter.report(event).await {
        warn!("Failed to report setup failure: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctorcam_camera::{Pattern, SyntheticCamera};
    use proctorcam_reporting::RecordingReporter;
    use proctorcam_types::config::FacingMode;
    use tokio::time::Duration;

    fn session() -> SessionContext {
        SessionContext {
            test_id: "12345".into(),
            test_session_id: "67890".into(),
            token: "tok".into(),
            device_fingerprint: None,
        }
    }

    async fn streaming_camera() -> CameraSession<SyntheticCamera> {
        let camera = SyntheticCamera::new(320, 240, Pattern::Gradient);
        let mut session = CameraSession::new(camera, FacingMode::User, Duration::from_millis(0));
        session.start().await.expect("start");
        session
    }

    #[tokio::test]
    async fn setup_without_stream_reports_failure() {
        let camera = SyntheticCamera::new(320, 240, Pattern::Gradient);
        let mut camera = CameraSession::new(camera, FacingMode::User, Duration::from_millis(0));
        let reporter = RecordingReporter::new(8);

        let err = confirm_setup(&mut camera, &reporter, session().with_fingerprint("fp"))
            .await
            .expect_err("not streaming");
        assert!(matches!(err, ProctorError::NotStreaming));

        let events = reporter.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::SetupFail);
        assert!(events[0].device_fingerprint.is_none());
        assert!(reporter.compatibility_checks().await.is_empty());
    }

    #[tokio::test]
    async fn setup_reports_fingerprint_and_checks_image() {
        let mut camera = streaming_camera().await;
        let reporter = RecordingReporter::new(8);

        let confirmed = confirm_setup(&mut camera, &reporter, session())
            .await
            .expect("setup");
        let fingerprint = confirmed.device_fingerprint.clone().expect("fingerprint");
        assert_eq!(fingerprint, device_fingerprint());

        let events = reporter.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::SetupSuccess);
        assert!(events[0].device_fingerprint.is_none());
        assert_eq!(
            events[0].extra_data.as_ref().map(|d| d.value.as_str()),
            Some(Some(fingerprint.as_str()))
        );
        assert_eq!(reporter.compatibility_checks().await.len(), 1);
    }

    #[tokio::test]
    async fn configured_fingerprint_wins() {
        let mut camera = streaming_camera().await;
        let reporter = RecordingReporter::new(8);
        let confirmed = confirm_setup(&mut camera, &reporter, session().with_fingerprint("fixed"))
            .await
            .expect("setup");
        assert_eq!(confirmed.device_fingerprint.as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn incompatible_image_fails_setup() {
        let mut camera = streaming_camera().await;
        let reporter = RecordingReporter::new(8);
        reporter.set_compatible(false);

        let err = confirm_setup(&mut camera, &reporter, session())
            .await
            .expect_err("incompatible");
        assert!(matches!(err, ProctorError::CompatibilityCheckFailed(_)));
        assert_eq!(reporter.count(EventName::SetupSuccess).await, 1);
        assert_eq!(reporter.count(EventName::ImageIncompatible).await, 1);
    }

    #[tokio::test]
    async fn failed_setup_report_fails_setup() {
        let mut camera = streaming_camera().await;
        let reporter = RecordingReporter::new(8);
        reporter.set_failing(true);

        let err = confirm_setup(&mut camera, &reporter, session())
            .await
            .expect_err("report failed");
        assert!(matches!(err, ProctorError::Reporting(_)));
        assert!(reporter.compatibility_checks().await.is_empty());
    }

    #[tokio::test]
    async fn unencodable_setup_frame_reports_failure() {
        // JPEG dimensions are limited to 65535 pixels per side.
        let camera = SyntheticCamera::new(70_000, 1, Pattern::Solid([200, 200, 200]));
        let mut camera = CameraSession::new(camera, FacingMode::User, Duration::from_millis(0));
        camera.start().await.expect("start");
        let reporter = RecordingReporter::new(8);

        let err = confirm_setup(&mut camera, &reporter, session())
            .await
            .expect_err("encode failed");
        assert!(matches!(err, ProctorError::Encoding(_)));
        assert_eq!(reporter.count(EventName::SetupFail).await, 1);
        assert_eq!(reporter.count(EventName::SetupSuccess).await, 0);
        assert!(reporter.compatibility_checks().await.is_empty());
    }
}
