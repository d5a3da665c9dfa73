//! LogDNA callback pipeline for orchestration events
//!
//! This module turns per-host task results into structured log records and
//! ships them to the LogDNA ingestion API without blocking the run.
//!
//! # Architecture
//!
//! Each event passes through four stages:
//!
//! 1. **[`filter`]**: drops events matching a configured ignore list
//! 2. **[`format`]**: renders the log line, severity, identity and metadata
//! 3. **[`transport`]**: queues the record for background batched delivery
//! 4. **[`config`]**: resolves all of the above once, before the first event
//!
//! [`LogdnaCallback`] wires the stages behind the [`ExecutionCallback`] trait.
//!
//! # Quick Start with Prelude
//!
//! ```rust,ignore
//! use logdna_callback::callback::prelude::*;
//!
//! let config = LogdnaConfig::builder()
//!     .ingestion_key("ffffffffffffffffffffffffffffffff")
//!     .app_name("deploy")
//!     .tag("prod")
//!     .build();
//! let callback = LogdnaCallback::new(config);
//!
//! callback.on_playbook_start("site.yml").await;
//! callback
//!     .on_runner_ok(TaskEvent::new("copy", EventStatus::Changed, "web1"))
//!     .await;
//! callback.on_playbook_end().await;
//! ```
//!
//! [`ExecutionCallback`]: crate::traits::ExecutionCallback

pub mod config;
pub mod filter;
pub mod format;
pub mod plugins;
pub mod transport;
pub mod types;

pub use config::{AddressSetting, IgnoreList, LogdnaConfig, LogdnaConfigBuilder, NativeConfig};
pub use filter::{ignore_reason, should_forward, IgnoreReason};
pub use format::{
    EventFormatter, FormattedRecord, HostIdentity, LogTemplate, Severity, SeverityPolicy,
};
pub use plugins::LogdnaCallback;
pub use transport::{HttpIngest, IngestSink, LogdnaTransport, SendOutcome, TransportStats};
pub use types::{CallbackEvent, EventStatus, HostStats, RunStats, TaskEvent};

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for callback usage.
///
/// - **Core Traits**: [`ExecutionCallback`], [`IngestSink`]
/// - **Events**: [`TaskEvent`], [`EventStatus`], [`RunStats`], [`CallbackEvent`]
/// - **Pipeline**: [`LogdnaCallback`], [`LogdnaConfig`], [`EventFormatter`], [`LogdnaTransport`]
///
/// [`ExecutionCallback`]: crate::traits::ExecutionCallback
pub mod prelude {
    pub use crate::traits::ExecutionCallback;

    pub use super::{CallbackEvent, EventStatus, HostStats, RunStats, TaskEvent};

    pub use super::{
        EventFormatter, FormattedRecord, HostIdentity, IngestSink, LogdnaCallback, LogdnaConfig,
        LogdnaTransport, SendOutcome, Severity, SeverityPolicy,
    };
}
