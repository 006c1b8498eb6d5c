//! Persists audit records. Failures here are reported to the caller of `record`
//! and only logged by `record_best_effort`; the response path uses the latter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coachline_core::config::TelemetryConfig;
use coachline_core::telemetry::{LogRecord, RecordPolicy};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::repositories::{BlobStore, RepositoryError, StoredBlob};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("audit record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct TelemetryRecorder {
    store: Arc<dyn BlobStore>,
    environment: String,
    policy: RecordPolicy,
    enabled: bool,
    in_flight: Arc<InFlight>,
}

/// Count of spawned writes that have not finished yet.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl TelemetryRecorder {
    pub fn new(
        store: Arc<dyn BlobStore>,
        environment: impl Into<String>,
        policy: RecordPolicy,
    ) -> Self {
        Self {
            store,
            environment: environment.into(),
            policy,
            enabled: true,
            in_flight: Arc::default(),
        }
    }

    pub fn from_config(store: Arc<dyn BlobStore>, config: &TelemetryConfig) -> Self {
        Self {
            store,
            environment: config.environment.clone(),
            policy: config.record_policy(),
            enabled: config.enabled,
            in_flight: Arc::default(),
        }
    }

    pub fn policy(&self) -> RecordPolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Writes `record` once. Returns the key, or `None` when recording is disabled.
    pub async fn record(
        &self,
        record: &LogRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, RecordError> {
        if !self.enabled {
            return Ok(None);
        }

        let body = record.to_stored_json(self.policy)?;
        let key = record.storage_key(&self.environment, now);
        self.store
            .put(StoredBlob {
                key: key.clone(),
                kind: record.kind().to_string(),
                body,
                created_at: now,
            })
            .await?;

        Ok(Some(key))
    }

    pub async fn record_best_effort(&self, record: &LogRecord, correlation_id: &str) {
        match self.record(record, Utc::now()).await {
            Ok(Some(key)) => debug!(
                event_name = "telemetry.recorded",
                correlation_id = %correlation_id,
                kind = record.kind(),
                key = %key,
            ),
            Ok(None) => {}
            Err(error) => warn!(
                event_name = "telemetry.write_failed",
                correlation_id = %correlation_id,
                kind = record.kind(),
                error = %error,
                "audit record dropped"
            ),
        }
    }

    /// Detached write; the returned handle is only useful to tests.
    pub fn spawn(&self, record: LogRecord, correlation_id: String) -> JoinHandle<()> {
        let recorder = self.clone();
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            recorder.record_best_effort(&record, &correlation_id).await;
            recorder.in_flight.finish();
        })
    }

    pub fn pending_writes(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits for spawned writes to finish. Returns `false` if `grace` ran out first.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.in_flight.wait_idle()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use coachline_core::normalize::{normalize, ConversationInput};
    use coachline_core::telemetry::{
        CoachExchange, ExchangeFacts, FeedbackEntry, LogRecord, RecordPolicy,
    };

    use super::{RecordError, TelemetryRecorder};
    use crate::repositories::{BlobStore, InMemoryBlobStore, RepositoryError, StoredBlob};

    struct UnavailableStore;

    #[async_trait]
    impl BlobStore for UnavailableStore {
        async fn put(&self, _blob: StoredBlob) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("disk full".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<StoredBlob>, RepositoryError> {
            Ok(None)
        }

        async fn count(&self, _kind: Option<&str>) -> Result<u64, RepositoryError> {
            Ok(0)
        }

        async fn ping(&self) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("disk full".to_string()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 3, 11).single().expect("valid time")
    }

    fn exchange(question: &str, answer: &str) -> LogRecord {
        let input = normalize(ConversationInput::Question(question.to_string())).expect("input");
        LogRecord::Coach(CoachExchange::build(
            ExchangeFacts {
                correlation_id: "corr-1",
                input: &input,
                answer,
                user_agent: "curl/8.5",
                model: "gpt-4o-mini",
                mode: None,
                review: "off",
                usage: None,
            },
            RecordPolicy::default(),
            now(),
        ))
    }

    #[tokio::test]
    async fn record_writes_redacted_body_under_environment_key() {
        let store = Arc::new(InMemoryBlobStore::new());
        let recorder = TelemetryRecorder::new(store.clone(), "staging", RecordPolicy::default());

        let key = recorder
            .record(&exchange("Call me at 415-555-0199", "Noted."), now())
            .await
            .expect("record")
            .expect("enabled recorder returns key");

        assert!(key.starts_with("staging/2026-10-19/"));
        let stored = store.get(&key).await.expect("get").expect("stored");
        assert_eq!(stored.kind, "coach");
        assert!(!stored.body.contains("415-555-0199"));
        assert!(stored.body.contains("[REDACTED_PHONE]"));
    }

    #[tokio::test]
    async fn feedback_is_namespaced_separately() {
        let store = Arc::new(InMemoryBlobStore::new());
        let recorder = TelemetryRecorder::new(store.clone(), "production", RecordPolicy::default());
        let entry = FeedbackEntry::from_slice(br#"{"good":true,"why":"clear"}"#, "ua", now())
            .expect("feedback");

        let key = recorder
            .record(&LogRecord::Feedback(entry), now())
            .await
            .expect("record")
            .expect("key");

        assert!(key.starts_with("production/feedback/2026-10-19/"));
        assert_eq!(store.count(Some("feedback")).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn store_failure_is_reported_by_record_and_swallowed_by_best_effort() {
        let recorder =
            TelemetryRecorder::new(Arc::new(UnavailableStore), "dev", RecordPolicy::default());
        let record = exchange("Hello", "Hi");

        let result = recorder.record(&record, now()).await;
        assert!(matches!(result, Err(RecordError::Store(RepositoryError::Unavailable(_)))));

        recorder.spawn(record, "corr-1".to_string()).await.expect("task completes");
    }

    struct SlowStore {
        inner: InMemoryBlobStore,
        delay: Duration,
    }

    #[async_trait]
    impl BlobStore for SlowStore {
        async fn put(&self, blob: StoredBlob) -> Result<(), RepositoryError> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(blob).await
        }

        async fn get(&self, key: &str) -> Result<Option<StoredBlob>, RepositoryError> {
            self.inner.get(key).await
        }

        async fn count(&self, kind: Option<&str>) -> Result<u64, RepositoryError> {
            self.inner.count(kind).await
        }

        async fn ping(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_waits_for_spawned_writes() {
        let store =
            Arc::new(SlowStore { inner: InMemoryBlobStore::new(), delay: Duration::from_millis(30) });
        let recorder = TelemetryRecorder::new(store.clone(), "dev", RecordPolicy::default());

        for index in 0..3 {
            recorder.spawn(exchange("Hello", "Hi"), format!("corr-{index}"));
        }
        assert_eq!(recorder.pending_writes(), 3);

        assert!(recorder.drain(Duration::from_secs(5)).await);
        assert_eq!(recorder.pending_writes(), 0);
        assert_eq!(store.count(None).await.expect("count"), 3);
        assert!(recorder.drain(Duration::from_millis(1)).await, "idle recorder drains at once");
    }

    #[tokio::test]
    async fn drain_gives_up_after_grace_period() {
        let store =
            Arc::new(SlowStore { inner: InMemoryBlobStore::new(), delay: Duration::from_secs(60) });
        let recorder = TelemetryRecorder::new(store, "dev", RecordPolicy::default());

        recorder.spawn(exchange("Hello", "Hi"), "corr-slow".to_string());

        assert!(!recorder.drain(Duration::from_millis(20)).await);
        assert_eq!(recorder.pending_writes(), 1);
    }

    #[tokio::test]
    async fn disabled_recorder_writes_nothing() {
        let store = Arc::new(InMemoryBlobStore::new());
        let config = coachline_core::config::TelemetryConfig {
            enabled: false,
            environment: "dev".to_string(),
            verbose: false,
            redact_pii: true,
        };
        let recorder = TelemetryRecorder::from_config(store.clone(), &config);

        let key = recorder.record(&exchange("Hello", "Hi"), now()).await.expect("record");

        assert_eq!(key, None);
        assert_eq!(store.count(None).await.expect("count"), 0);
    }
}
