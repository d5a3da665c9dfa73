//! LogDNA callback plugin.
//!
//! Forwards each per-host task result to LogDNA as one structured log line.
//!
//! # Features
//!
//! - Ignore lists for statuses, actions, roles and playbooks
//! - Configurable log line template
//! - Task execution time measured from task start
//! - Per-host summary records at the end of the run
//! - Non-blocking delivery with a bounded flush at playbook end
//!
//! # Example
//!
//! ```rust,ignore
//! use logdna_callback::prelude::*;
//!
//! let callback = LogdnaCallback::load(None)?;
//! callback.on_playbook_start("site.yml").await;
//! callback
//!     .on_runner_ok(TaskEvent::new("copy", EventStatus::Changed, "web1"))
//!     .await;
//! callback.on_playbook_end().await;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::callback::config::{process_environment, LogdnaConfig};
use crate::callback::filter::{ignore_reason, should_forward_stats};
use crate::callback::format::EventFormatter;
use crate::callback::transport::{IngestSink, LogdnaTransport, SendOutcome, TransportStats};
use crate::callback::types::{RunStats, TaskEvent};
use crate::error::Result;
use crate::traits::ExecutionCallback;

// ============================================================================
// Internal State
// ============================================================================

#[derive(Debug, Default)]
struct LogdnaState {
    /// Basename of the running playbook
    playbook: Option<String>,
    /// Task start times keyed by task uuid
    task_starts: HashMap<String, Instant>,
}

// ============================================================================
// LogDNA Callback Implementation
// ============================================================================

/// Callback forwarding task results to LogDNA.
///
/// Listener methods never fail: filtering, formatting and hand-off happen
/// inline, network I/O happens on the transport's background task.
#[derive(Debug)]
pub struct LogdnaCallback {
    config: Arc<LogdnaConfig>,
    formatter: EventFormatter,
    transport: LogdnaTransport,
    state: RwLock<LogdnaState>,
}

impl LogdnaCallback {
    /// Create a callback delivering over HTTP.
    ///
    /// Must be called inside a tokio runtime when an ingestion key is set.
    pub fn new(config: LogdnaConfig) -> Self {
        let transport = LogdnaTransport::new(&config);
        let config = Arc::new(config);
        let formatter = EventFormatter::new(Arc::clone(&config));
        Self::with_components(config, formatter, transport)
    }

    /// Create a callback from `ansible.cfg` and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Ok(Self::new(LogdnaConfig::load(config_path)?))
    }

    /// Create a callback from `LOGDNA_*` environment variables only.
    pub fn from_env() -> Self {
        Self::new(LogdnaConfig::resolve(&HashMap::new(), &process_environment()))
    }

    /// Create a callback delivering to a custom sink.
    pub fn with_sink(config: LogdnaConfig, sink: Arc<dyn IngestSink>) -> Self {
        let transport = if config.is_enabled() {
            LogdnaTransport::with_sink(&config, sink)
        } else {
            LogdnaTransport::disabled()
        };
        let config = Arc::new(config);
        let formatter = EventFormatter::new(Arc::clone(&config));
        Self::with_components(config, formatter, transport)
    }

    /// Assemble a callback from prebuilt parts.
    pub fn with_components(
        config: Arc<LogdnaConfig>,
        formatter: EventFormatter,
        transport: LogdnaTransport,
    ) -> Self {
        if !config.is_enabled() {
            warn!("LogDNA ingestion key not set; events will not be forwarded");
        }
        Self {
            config,
            formatter,
            transport,
            state: RwLock::new(LogdnaState::default()),
        }
    }

    /// The resolved configuration.
    pub fn config(&self) -> &LogdnaConfig {
        &self.config
    }

    /// Delivery counters.
    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Filter, format and hand off one task result.
    async fn handle_result(&self, mut event: TaskEvent) {
        {
            let state = self.state.read();
            if event.playbook.is_none() {
                event.playbook = state.playbook.clone();
            }
            if event.duration.is_none() {
                event.duration = event
                    .task_uuid
                    .as_ref()
                    .and_then(|uuid| state.task_starts.get(uuid))
                    .map(Instant::elapsed);
            }
        }

        if let Some(reason) = ignore_reason(&event, &self.config) {
            trace!(
                "Ignoring {} result for {} on {} (matched ignore_{})",
                event.status,
                event.action,
                event.host,
                reason
            );
            return;
        }

        if !self.transport.is_enabled() {
            return;
        }

        let record = self.formatter.format(&event);
        if self.transport.send(record) == SendOutcome::Dropped {
            debug!("Dropped {} result for {}", event.status, event.host);
        }
    }
}

#[async_trait]
impl ExecutionCallback for LogdnaCallback {
    async fn on_playbook_start(&self, playbook: &str) {
        let name = Path::new(playbook)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| playbook.to_string());
        debug!("LogDNA: playbook {} started", name);

        let mut state = self.state.write();
        state.playbook = Some(name);
        state.task_starts.clear();
    }

    async fn on_task_start(&self, task_uuid: &str) {
        self.state
            .write()
            .task_starts
            .insert(task_uuid.to_string(), Instant::now());
    }

    async fn on_runner_ok(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_runner_failed(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_runner_skipped(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_runner_unreachable(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_async_ok(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_async_failed(&self, event: TaskEvent) {
        self.handle_result(event).await;
    }

    async fn on_stats(&self, stats: &RunStats) {
        if !self.transport.is_enabled() {
            return;
        }

        let playbook = self.state.read().playbook.clone();
        if !should_forward_stats(playbook.as_deref(), &self.config) {
            trace!("Ignoring run statistics");
            return;
        }

        for record in self.formatter.format_stats(playbook.as_deref(), stats) {
            self.transport.send(record);
        }
    }

    async fn on_playbook_end(&self) {
        self.transport.shutdown().await;

        let stats = self.transport.stats();
        if stats.dropped > 0 || stats.failed > 0 {
            warn!(
                "LogDNA: {} records delivered, {} failed, {} dropped",
                stats.delivered, stats.failed, stats.dropped
            );
        } else {
            debug!("LogDNA: {} records delivered", stats.delivered);
        }
    }
}
