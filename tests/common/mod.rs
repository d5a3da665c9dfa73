//! Shared test utilities and fixtures for the logdna-callback test suite.
//!
//! This module provides:
//! - Recording and failing [`IngestSink`] implementations
//! - Callback construction against a mock ingestion endpoint
//! - Helpers for decoding captured ingestion requests
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use logdna_callback::callback::config::{LogdnaConfig, LogdnaConfigBuilder};
use logdna_callback::callback::format::{EventFormatter, FormattedRecord, HostIdentity};
use logdna_callback::callback::transport::{IngestSink, LogdnaTransport};
use logdna_callback::callback::LogdnaCallback;
use logdna_callback::Result;

/// Ingestion key used throughout the tests.
pub const TEST_KEY: &str = "test-ingestion-key";

// ============================================================================
// Sinks
// ============================================================================

/// Sink that keeps every delivered record.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<FormattedRecord>>,
    deliveries: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<FormattedRecord> {
        self.records.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.line.clone()).collect()
    }

    pub fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestSink for RecordingSink {
    async fn deliver(&self, records: &[FormattedRecord]) -> Result<()> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        self.records.lock().extend_from_slice(records);
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Identity with fixed values so records are deterministic.
pub fn test_identity() -> HostIdentity {
    HostIdentity::new("control-node")
        .with_ip("10.1.2.3")
        .with_mac("02:42:ac:11:00:02")
}

/// Config builder with a key set.
pub fn enabled_config() -> LogdnaConfigBuilder {
    LogdnaConfig::builder().ingestion_key(TEST_KEY)
}

/// Callback with a fixed identity delivering to `sink`.
pub fn callback_with_sink(config: LogdnaConfig, sink: Arc<dyn IngestSink>) -> LogdnaCallback {
    let transport = if config.is_enabled() {
        LogdnaTransport::with_sink(&config, sink)
    } else {
        LogdnaTransport::disabled()
    };
    let config = Arc::new(config);
    let formatter = EventFormatter::with_identity(Arc::clone(&config), test_identity());
    LogdnaCallback::with_components(config, formatter, transport)
}

/// Callback with a fixed identity posting to `server` over HTTP.
pub fn callback_for_server(server: &MockServer, config: LogdnaConfigBuilder) -> LogdnaCallback {
    let config = config.endpoint_host(server.uri()).build();
    let transport = LogdnaTransport::new(&config);
    let config = Arc::new(config);
    let formatter = EventFormatter::with_identity(Arc::clone(&config), test_identity());
    LogdnaCallback::with_components(config, formatter, transport)
}

// ============================================================================
// Mock Ingestion Endpoint
// ============================================================================

/// Start a server accepting every POST to the default ingestion path.
pub async fn ingest_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;
    server
}

/// Start a server that answers after `delay`.
pub async fn slow_ingest_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logs/ingest"))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .mount(&server)
        .await;
    server
}

/// Every line object posted to `server`, in arrival order.
pub async fn received_lines(server: &MockServer) -> Vec<JsonValue> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .flat_map(|request| {
            let body: JsonValue = serde_json::from_slice(&request.body).unwrap();
            body["lines"].as_array().cloned().unwrap_or_default()
        })
        .collect()
}
