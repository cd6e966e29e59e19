use std::time::Duration;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use proctorcam_types::{
    events::{EventName, ExtraData, ProctorEvent, SessionContext},
    ProctorError, Result,
};
use reqwest::{multipart, Client, Response};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::{reporting_error, EventReporter};

const EVENTS_PATH: &str = "api/v3/proctoring/dual_camera/events";
const COMPATIBILITY_PATH: &str = "api/v3/proctoring/dual_camera/check_compatibility";
const EVENT_TYPE: &str = "secondary_camera";
const API_CONTEXT_TYPE: &str = "interviewbit_test";

#[derive(Debug, Serialize)]
pub struct WireEvent<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: EventName,
    pub data: Option<&'a ExtraData>,
}

/// JSON body accepted by the events endpoint.
#[derive(Debug, Serialize)]
pub struct ReportBody<'a> {
    pub events: Vec<WireEvent<'a>>,
}

impl<'a> ReportBody<'a> {
    pub fn single(event: &'a ProctorEvent) -> Self {
        Self {
            events: vec![WireEvent {
                kind: EVENT_TYPE,
                name: event.name,
                data: event.extra_data.as_ref(),
            }],
        }
    }
}

/// Posts events to the proctoring backend.
#[derive(Clone)]
pub struct HttpReporter {
    client: Client,
    base_url: String,
    tx: broadcast::Sender<ProctorEvent>,
}

impl HttpReporter {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| reporting_error(format!("failed to build http client: {err}")))?;
        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tx,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Query parameters identifying the test and, when known, the device.
    pub fn event_query(event: &ProctorEvent) -> Vec<(&'static str, String)> {
        let mut query = api_context(&event.test_id);
        query.push(("token", event.token.clone()));
        if let Some(fingerprint) = &event.device_fingerprint {
            query.push(("device_fingerprint", fingerprint.clone()));
        }
        query
    }
}

fn api_context(test_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("api_context[id]", test_id.to_string()),
        ("api_context[type]", API_CONTEXT_TYPE.to_string()),
    ]
}

async fn ensure_success(response: Response, what: &str) -> std::result::Result<(), String> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(format!("{what} returned {status}: {text}"))
}

#[async_trait]
impl EventReporter for HttpReporter {
    async fn report(&self, event: ProctorEvent) -> Result<()> {
        let url = self.url(EVENTS_PATH);
        let response = self
            .client
            .post(&url)
            .query(&Self::event_query(&event))
            .json(&ReportBody::single(&event))
            .send()
            .await
            .map_err(|err| reporting_error(format!("POST {url}: {err}")))?;
        ensure_success(response, EVENTS_PATH)
            .await
            .map_err(reporting_error)?;

        debug!("Reported {} for test {}", event.name, event.test_id);
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn check_compatibility(&self, session: &SessionContext, image: Vec<u8>) -> Result<()> {
        let url = self.url(COMPATIBILITY_PATH);
        let part = multipart::Part::bytes(image)
            .file_name("captured_image.jpeg")
            .mime_str("image/jpeg")
            .map_err(|err| reporting_error(format!("invalid image part: {err}")))?;
        let form = multipart::Form::new().part("image", part);

        let mut query = api_context(&session.test_id);
        query.push(("token", session.token.clone()));

        let response = self
            .client
            .post(&url)
            .query(&query)
            .multipart(form)
            .send()
            .await
            .map_err(|err| reporting_error(format!("POST {url}: {err}")))?;
        ensure_success(response, COMPATIBILITY_PATH)
            .await
            .map_err(ProctorError::CompatibilityCheckFailed)
    }

    fn subscribe(&self) -> BoxStream<'static, ProctorEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}
