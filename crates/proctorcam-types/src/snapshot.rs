use std::{
    fmt,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SNAPSHOT_PREFIX: &str = "mobile_snapshots/interviewbit_test_sessions";

/// Storage object name of one snapshot: `{prefix}/{session}/image_{millis}.jpeg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    prefix: String,
    test_session_id: String,
    captured_at_ms: i64,
}

impl SnapshotKey {
    pub fn new(
        prefix: impl Into<String>,
        test_session_id: impl Into<String>,
        captured_at_ms: i64,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            test_session_id: test_session_id.into(),
            captured_at_ms,
        }
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn test_session_id(&self) -> &str {
        &self.test_session_id
    }

    pub fn as_path(&self) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        format!(
            "{}/{}/image_{}.jpeg",
            prefix, self.test_session_id, self.captured_at_ms
        )
    }

    /// `s3://{bucket}/{mode}/{key}` as reported with `snapshot_success`.
    pub fn storage_url(&self, bucket: &str, mode: &str) -> String {
        format!("s3://{}/{}/{}", bucket, mode, self.as_path())
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_path())
    }
}

/// Issues keys with strictly increasing timestamps.
///
/// Wall-clock millis are used when they advance; otherwise the previous
/// timestamp plus one, so keys stay unique within a session.
#[derive(Debug)]
pub struct SnapshotKeyGenerator {
    prefix: String,
    test_session_id: String,
    last_ms: AtomicI64,
}

impl SnapshotKeyGenerator {
    pub fn new(prefix: impl Into<String>, test_session_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            test_session_id: test_session_id.into(),
            last_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn next_key(&self) -> SnapshotKey {
        self.key_at(Utc::now().timestamp_millis())
    }

    pub fn key_at(&self, now_ms: i64) -> SnapshotKey {
        let mut previous = self.last_ms.load(Ordering::Relaxed);
        loop {
            let candidate = if now_ms > previous {
                now_ms
            } else {
                previous + 1
            };
            match self.last_ms.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return SnapshotKey::new(
                        self.prefix.clone(),
                        self.test_session_id.clone(),
                        candidate,
                    )
                }
                Err(actual) => previous = actual,
            }
        }
    }
}
