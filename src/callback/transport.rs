//! Delivery of formatted records to the LogDNA ingestion API.
//!
//! [`LogdnaTransport::send`] is a non-blocking hand-off into a bounded queue.
//! A background tokio task drains the queue in batches and delivers them
//! through an [`IngestSink`]; [`HttpIngest`] is the HTTP implementation.
//!
//! Delivery is best-effort:
//! - Failed requests are retried with exponential backoff, then dropped
//! - A full queue drops the record instead of blocking the caller
//! - [`LogdnaTransport::shutdown`] waits a bounded time for the queue to drain

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::config::LogdnaConfig;
use super::format::FormattedRecord;
use crate::error::{Error, Result};

/// User agent sent with every ingestion request.
pub const USER_AGENT: &str = concat!("logdna-callback/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Ingest Sink
// ============================================================================

/// Destination for batches of records.
///
/// Every record in a batch shares the same `hostname`.
#[async_trait]
pub trait IngestSink: Send + Sync + 'static {
    /// Deliver one batch.
    async fn deliver(&self, records: &[FormattedRecord]) -> Result<()>;
}

#[derive(Serialize)]
struct IngestPayload<'a> {
    lines: &'a [FormattedRecord],
}

/// HTTP client for the LogDNA ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpIngest {
    client: Client,
    endpoint: Url,
    ingestion_key: String,
    tags: Vec<String>,
    timeout: Duration,
}

impl HttpIngest {
    /// Create a client from the configuration.
    pub fn new(config: &LogdnaConfig) -> Result<Self> {
        let ingestion_key = config
            .ingestion_key
            .clone()
            .ok_or(Error::MissingIngestionKey)?;
        let endpoint = Self::endpoint_url(config)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            ingestion_key,
            tags: config.tags.clone(),
            timeout: config.timeout,
        })
    }

    /// Build the endpoint URL. Hosts without a scheme use HTTPS.
    pub fn endpoint_url(config: &LogdnaConfig) -> Result<Url> {
        let host = config.endpoint_host.trim().trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let raw = format!("{}{}", base, config.endpoint_path);

        Url::parse(&raw).map_err(|e| Error::InvalidEndpoint {
            endpoint: raw.clone(),
            message: e.to_string(),
        })
    }

    /// The endpoint requests are sent to, without query parameters.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_url(&self, hostname: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("hostname", hostname);
            query.append_pair("now", &Utc::now().timestamp_millis().to_string());
            if !self.tags.is_empty() {
                query.append_pair("tags", &self.tags.join(","));
            }
        }
        url
    }
}

#[async_trait]
impl IngestSink for HttpIngest {
    async fn deliver(&self, records: &[FormattedRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.request_url(&first.hostname))
            .basic_auth(&self.ingestion_key, Some(""))
            .header("Content-Type", "application/json; charset=UTF-8")
            .json(&IngestPayload { lines: records })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Transport(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Result of handing a record to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted for background delivery
    Queued,
    /// Forwarding is disabled; nothing was sent
    Disabled,
    /// Queue full or closed; the record was discarded
    Dropped,
}

/// Counters describing what the transport did with its records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Records accepted into the queue
    pub queued: u64,
    /// Records discarded at hand-off
    pub dropped: u64,
    /// Records acknowledged by the sink
    pub delivered: u64,
    /// Records given up on after retries
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> TransportStats {
        TransportStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    sender: Mutex<Option<mpsc::Sender<FormattedRecord>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    flush_timeout: Duration,
    /// Set once a record has been refused after shutdown
    closed_warned: AtomicBool,
}

/// Queue plus background delivery task.
pub struct LogdnaTransport {
    worker: Option<Worker>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for LogdnaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogdnaTransport")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .finish()
    }
}

impl LogdnaTransport {
    /// A transport that never sends anything.
    pub fn disabled() -> Self {
        Self {
            worker: None,
            counters: Arc::default(),
        }
    }

    /// Create a transport delivering over HTTP.
    ///
    /// Without an ingestion key, or with an unusable endpoint, the transport
    /// is disabled. Must be called inside a tokio runtime when enabled.
    pub fn new(config: &LogdnaConfig) -> Self {
        if !config.is_enabled() {
            return Self::disabled();
        }
        match HttpIngest::new(config) {
            Ok(ingest) => {
                debug!("LogDNA transport posting to {}", ingest.endpoint());
                Self::with_sink(config, Arc::new(ingest))
            }
            Err(e) => {
                warn!("LogDNA forwarding disabled: {}", e);
                Self::disabled()
            }
        }
    }

    /// Create a transport delivering to a custom sink.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_sink(config: &LogdnaConfig, sink: Arc<dyn IngestSink>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(run_worker(
            receiver,
            sink,
            config.batch_size.max(1),
            config.max_retries,
            Arc::clone(&counters),
        ));

        Self {
            worker: Some(Worker {
                sender: Mutex::new(Some(sender)),
                handle: Mutex::new(Some(handle)),
                flush_timeout: config.flush_timeout,
                closed_warned: AtomicBool::new(false),
            }),
            counters,
        }
    }

    /// Returns true if records are forwarded.
    pub fn is_enabled(&self) -> bool {
        self.worker.is_some()
    }

    /// Hand a record off for delivery. Never waits on the network.
    pub fn send(&self, record: FormattedRecord) -> SendOutcome {
        let Some(worker) = &self.worker else {
            return SendOutcome::Disabled;
        };

        let sender = worker.sender.lock();
        let accepted = match sender.as_ref() {
            Some(sender) => match sender.try_send(record) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("LogDNA delivery queue is full, dropping record");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("LogDNA delivery worker has stopped, dropping record");
                    false
                }
            },
            None => {
                if worker.closed_warned.swap(true, Ordering::Relaxed) {
                    debug!("LogDNA transport is shut down, dropping record");
                } else {
                    warn!("LogDNA transport is shut down; records after playbook end are not forwarded");
                }
                false
            }
        };

        if accepted {
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
            SendOutcome::Queued
        } else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            SendOutcome::Dropped
        }
    }

    /// Close the queue and wait, at most the flush timeout, for delivery.
    ///
    /// Later calls are no-ops.
    pub async fn shutdown(&self) {
        let Some(worker) = &self.worker else {
            return;
        };

        drop(worker.sender.lock().take());
        let handle = worker.handle.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(worker.flush_timeout, &mut handle).await {
            Ok(Ok(())) => {
                let stats = self.stats();
                debug!(
                    "LogDNA transport flushed: delivered={} failed={} dropped={}",
                    stats.delivered, stats.failed, stats.dropped
                );
            }
            Ok(Err(e)) => warn!("LogDNA delivery worker failed: {}", e),
            Err(_) => {
                handle.abort();
                let stats = self.stats();
                let pending = stats
                    .queued
                    .saturating_sub(stats.delivered + stats.failed);
                warn!(
                    "LogDNA flush timed out after {:?}, dropping {} undelivered records",
                    worker.flush_timeout, pending
                );
            }
        }
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<FormattedRecord>,
    sink: Arc<dyn IngestSink>,
    batch_size: usize,
    max_retries: u32,
    counters: Arc<Counters>,
) {
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(record) = receiver.recv().await {
        batch.push(record);
        while batch.len() < batch_size {
            match receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        for group in group_by_hostname(std::mem::take(&mut batch)) {
            let count = group.len() as u64;
            if deliver_with_retry(sink.as_ref(), &group, max_retries).await {
                counters.delivered.fetch_add(count, Ordering::Relaxed);
            } else {
                counters.failed.fetch_add(count, Ordering::Relaxed);
            }
        }
    }
}

/// Split a batch into runs sharing a hostname, keeping first-seen order.
fn group_by_hostname(records: Vec<FormattedRecord>) -> Vec<Vec<FormattedRecord>> {
    let mut groups: Vec<Vec<FormattedRecord>> = Vec::new();
    for record in records {
        match groups
            .iter_mut()
            .find(|group| group[0].hostname == record.hostname)
        {
            Some(group) => group.push(record),
            None => groups.push(vec![record]),
        }
    }
    groups
}

/// Longest pause between delivery attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 100ms doubled per attempt, capped at [`MAX_BACKOFF`].
fn backoff(attempt: u32) -> Duration {
    let millis = 100u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

async fn deliver_with_retry(sink: &dyn IngestSink, records: &[FormattedRecord], max_retries: u32) -> bool {
    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }

        match sink.deliver(records).await {
            Ok(()) => {
                debug!("Sent {} records to LogDNA", records.len());
                return true;
            }
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!("LogDNA send attempt {} failed: {}", attempt + 1, e);
            }
            Err(e) => {
                warn!(
                    "Dropping {} LogDNA records after {} attempts: {}",
                    records.len(),
                    attempt + 1,
                    e
                );
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::format::Severity;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    fn record(line: &str, hostname: &str) -> FormattedRecord {
        FormattedRecord {
            line: line.to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            app: "Ansible".to_string(),
            level: Some(Severity::Info),
            ip: None,
            mac: None,
            meta: json!({}),
            hostname: hostname.to_string(),
            tags: Vec::new(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl IngestSink for RecordingSink {
        async fn deliver(&self, records: &[FormattedRecord]) -> Result<()> {
            self.batches
                .lock()
                .push(records.iter().map(|r| r.line.clone()).collect());
            Ok(())
        }
    }

    struct FailingSink {
        attempts: AtomicU32,
        status: u16,
    }

    #[async_trait]
    impl IngestSink for FailingSink {
        async fn deliver(&self, _records: &[FormattedRecord]) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Rejected {
                status: self.status,
                body: String::new(),
            })
        }
    }

    struct StuckSink;

    #[async_trait]
    impl IngestSink for StuckSink {
        async fn deliver(&self, _records: &[FormattedRecord]) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn enabled_config() -> LogdnaConfig {
        LogdnaConfig::builder().ingestion_key("key").build()
    }

    #[tokio::test]
    async fn test_disabled_transport() {
        let transport = LogdnaTransport::new(&LogdnaConfig::default());
        assert!(!transport.is_enabled());
        assert_eq!(transport.send(record("a", "h")), SendOutcome::Disabled);
        transport.shutdown().await;
        assert_eq!(transport.stats(), TransportStats::default());
    }

    #[tokio::test]
    async fn test_records_delivered_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let transport = LogdnaTransport::with_sink(&enabled_config(), sink.clone());

        for line in ["one", "two", "three"] {
            assert_eq!(transport.send(record(line, "control")), SendOutcome::Queued);
        }
        transport.shutdown().await;

        let delivered: Vec<String> = sink.batches.lock().iter().flatten().cloned().collect();
        assert_eq!(delivered, vec!["one", "two", "three"]);
        assert_eq!(transport.stats().delivered, 3);
        assert_eq!(transport.send(record("late", "control")), SendOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_records_after_shutdown_warn_once() {
        let transport = LogdnaTransport::with_sink(&enabled_config(), Arc::new(RecordingSink::default()));
        let closed_warned = |t: &LogdnaTransport| {
            t.worker
                .as_ref()
                .map(|w| w.closed_warned.load(Ordering::Relaxed))
        };

        transport.send(record("before", "control"));
        assert_eq!(closed_warned(&transport), Some(false));

        transport.shutdown().await;
        assert_eq!(transport.send(record("late", "control")), SendOutcome::Dropped);
        assert_eq!(closed_warned(&transport), Some(true));
        assert_eq!(transport.send(record("later", "control")), SendOutcome::Dropped);
        assert_eq!(transport.stats().dropped, 2);
    }

    #[test]
    fn test_group_by_hostname() {
        let groups = group_by_hostname(vec![
            record("a", "web1"),
            record("b", "web2"),
            record("c", "web1"),
        ]);
        let lines: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|r| r.line.as_str()).collect())
            .collect();
        assert_eq!(lines, vec![vec!["a", "c"], vec!["b"]]);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(3), Duration::from_millis(800));
        assert_eq!(backoff(57), MAX_BACKOFF);
        assert_eq!(backoff(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_retryable_failures_are_retried_then_dropped() {
        let sink = Arc::new(FailingSink {
            attempts: AtomicU32::new(0),
            status: 503,
        });
        let config = LogdnaConfig::builder()
            .ingestion_key("key")
            .max_retries(1)
            .build();
        let transport = LogdnaTransport::with_sink(&config, sink.clone());

        transport.send(record("a", "h"));
        transport.shutdown().await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(transport.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let sink = Arc::new(FailingSink {
            attempts: AtomicU32::new(0),
            status: 401,
        });
        let transport = LogdnaTransport::with_sink(&enabled_config(), sink.clone());

        transport.send(record("a", "h"));
        transport.shutdown().await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_shutdown_is_bounded() {
        let config = LogdnaConfig::builder()
            .ingestion_key("key")
            .queue_capacity(1)
            .batch_size(1)
            .flush_timeout(Duration::from_millis(50))
            .build();
        let transport = LogdnaTransport::with_sink(&config, Arc::new(StuckSink));

        let outcomes: Vec<SendOutcome> = (0..3)
            .map(|i| transport.send(record(&i.to_string(), "h")))
            .collect();
        assert!(outcomes.contains(&SendOutcome::Dropped));

        let started = std::time::Instant::now();
        transport.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_endpoint_url() {
        let url = HttpIngest::endpoint_url(&LogdnaConfig::default()).unwrap();
        assert_eq!(url.as_str(), "https://logs.logdna.com/logs/ingest");

        let config = LogdnaConfig::builder()
            .endpoint_host("http://127.0.0.1:8080/")
            .endpoint_path("/custom")
            .build();
        let url = HttpIngest::endpoint_url(&config).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/custom");

        let config = LogdnaConfig::builder().endpoint_host("bad host:x").build();
        assert!(matches!(
            HttpIngest::endpoint_url(&config),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_http_ingest_requires_key() {
        assert!(matches!(
            HttpIngest::new(&LogdnaConfig::default()),
            Err(Error::MissingIngestionKey)
        ));
    }
}
