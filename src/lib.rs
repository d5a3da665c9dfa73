//! # logdna-callback - Playbook events to LogDNA
//!
//! A callback for Ansible-style orchestration runs that forwards every
//! per-host task result to the LogDNA ingestion API as a structured log line,
//! without ever blocking or failing the run.
//!
//! ## Core Concepts
//!
//! - **Events**: task results (ok, changed, failed, skipped, unreachable,
//!   async) plus end-of-run statistics
//! - **Filter**: ignore lists for statuses, actions, roles and playbooks
//! - **Formatter**: a user template for the line, plus severity, identity and
//!   metadata
//! - **Transport**: bounded queue, batched background delivery, bounded flush
//! - **Configuration**: `[callback_logdna]` in ansible.cfg over `LOGDNA_*`
//!   environment variables over defaults
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ Host runtime │──▶│  Filter  │──▶│  Formatter  │──▶│ Transport queue  │
//! │  (callback)  │   │          │   │             │   │   (try_send)     │
//! └──────────────┘   └──────────┘   └─────────────┘   └──────────────────┘
//!                                                              │
//!                                                              ▼
//!                                                    ┌──────────────────┐
//!                                                    │ Background task  │
//!                                                    │ POST /logs/ingest│
//!                                                    └──────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use logdna_callback::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let callback = LogdnaCallback::load(None)?;
//!
//!     callback.on_playbook_start("site.yml").await;
//!     callback
//!         .on_runner_failed(TaskEvent::new("shell", EventStatus::Failed, "db1"))
//!         .await;
//!     callback.on_playbook_end().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! See [`callback::prelude`] for the full callback API.
    //!
    //! [`callback::prelude`]: crate::callback::prelude

    // Error handling
    pub use crate::error::{Error, Result};

    // Core traits
    pub use crate::traits::*;

    // Callback pipeline
    pub use crate::callback::prelude::*;
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Core traits for receiving lifecycle events.
pub mod traits;

// ============================================================================
// Callback Pipeline
// ============================================================================

/// Filtering, formatting, configuration and delivery of callback events.
pub mod callback;

// Re-export the main types at crate root
pub use callback::{LogdnaCallback, LogdnaConfig};
pub use error::{Error, Result};
pub use traits::ExecutionCallback;
