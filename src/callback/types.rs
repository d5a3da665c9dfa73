//! Callback event types for the LogDNA pipeline
//!
//! This module defines the event types the host orchestration tool hands to
//! the callback: per-task results, end-of-run statistics, and the tagged
//! [`CallbackEvent`] envelope used when events arrive as a JSON-lines stream.
//!
//! ## Event Categories
//!
//! - **Playbook Events**: Start/end of a playbook run
//! - **Task Events**: Task start plus ok, failed, skipped, unreachable and
//!   async poll results
//! - **Stats Events**: Final per-host counters

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

// ============================================================================
// Event Status
// ============================================================================

/// Outcome of a task on a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Task ran and made no changes
    Ok,
    /// Task ran and changed the host
    Changed,
    /// Task failed
    Failed,
    /// Host could not be reached
    Unreachable,
    /// Task was skipped (condition not met)
    Skipped,
    /// Async job finished successfully
    AsyncOk,
    /// Async job failed
    AsyncFailed,
}

impl EventStatus {
    /// All statuses, in declaration order.
    pub const ALL: [EventStatus; 7] = [
        EventStatus::Ok,
        EventStatus::Changed,
        EventStatus::Failed,
        EventStatus::Unreachable,
        EventStatus::Skipped,
        EventStatus::AsyncOk,
        EventStatus::AsyncFailed,
    ];

    /// Lowercase name, as matched by `ignore_status` and rendered by `{status}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Changed => "changed",
            EventStatus::Failed => "failed",
            EventStatus::Unreachable => "unreachable",
            EventStatus::Skipped => "skipped",
            EventStatus::AsyncOk => "async_ok",
            EventStatus::AsyncFailed => "async_failed",
        }
    }

    /// Returns true for statuses that represent a failure on the host.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventStatus::Failed | EventStatus::Unreachable | EventStatus::AsyncFailed
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        EventStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::invalid_config("status", format!("Unknown event status: {}", s)))
    }
}

// ============================================================================
// Task Event
// ============================================================================

/// A single task result on a single host.
///
/// Created by the host at each event boundary, consumed synchronously by the
/// callback and discarded once formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Module/action that ran (e.g. "shell", "copy")
    pub action: String,
    /// Outcome of the task
    pub status: EventStatus,
    /// Managed node the task ran against
    pub host: String,
    /// Playbook file, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    /// Role the task belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Task name, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Whether the task reported a change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
    /// Opaque result payload, passed through untouched
    #[serde(default)]
    pub result: JsonValue,
    /// Task identifier, used to match the task start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_uuid: Option<String>,
    /// Whether the run is in check mode
    #[serde(default)]
    pub check_mode: bool,
    /// Execution time, filled in by the callback from the task start
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_duration_secs")]
    pub duration: Option<Duration>,
    /// When the event was emitted
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Create an event with the required fields; everything else is empty.
    pub fn new(action: impl Into<String>, status: EventStatus, host: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status,
            host: host.into(),
            playbook: None,
            role: None,
            task_name: None,
            changed: None,
            result: JsonValue::Null,
            task_uuid: None,
            check_mode: false,
            duration: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the playbook.
    pub fn with_playbook(mut self, playbook: impl Into<String>) -> Self {
        self.playbook = Some(playbook.into());
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the task name.
    pub fn with_task_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = Some(name.into());
        self
    }

    /// Set the changed flag.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = Some(changed);
        self
    }

    /// Set the result payload.
    pub fn with_result(mut self, result: JsonValue) -> Self {
        self.result = result;
        self
    }

    /// Set the task identifier.
    pub fn with_task_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.task_uuid = Some(uuid.into());
        self
    }

    /// Mark the event as produced in check mode.
    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    /// Changed flag, falling back to the `changed` key of the result payload.
    pub fn changed(&self) -> Option<bool> {
        self.changed
            .or_else(|| self.result.get("changed").and_then(JsonValue::as_bool))
    }
}

// ============================================================================
// Run Statistics
// ============================================================================

/// Per-host counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostStats {
    /// Tasks that ran without changes
    pub ok: u32,
    /// Tasks that changed the host
    pub changed: u32,
    /// Failed tasks
    pub failures: u32,
    /// Unreachable attempts
    pub unreachable: u32,
    /// Skipped tasks
    pub skipped: u32,
    /// Rescued failures
    pub rescued: u32,
    /// Ignored failures
    pub ignored: u32,
}

/// Aggregate statistics for a finished run, keyed by host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunStats {
    hosts: BTreeMap<String, HostStats>,
}

impl RunStats {
    /// Create empty run statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the counters for a host, replacing any earlier value.
    pub fn insert(&mut self, host: impl Into<String>, stats: HostStats) {
        self.hosts.insert(host.into(), stats);
    }

    /// Counters for a single host.
    pub fn get(&self, host: &str) -> Option<&HostStats> {
        self.hosts.get(host)
    }

    /// Iterate hosts in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HostStats)> {
        self.hosts.iter()
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns true if no host reported.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

// ============================================================================
// Event Envelope
// ============================================================================

/// All lifecycle events, as they appear in a JSON-lines event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// A playbook run started.
    PlaybookStart {
        /// Path of the playbook file
        playbook: String,
    },
    /// A task started; used to time the task.
    TaskStart {
        /// Task identifier
        task_uuid: String,
    },
    /// A task finished on one host.
    TaskResult(TaskEvent),
    /// End-of-run statistics.
    Stats {
        /// Per-host counters
        stats: RunStats,
    },
    /// The playbook run ended.
    PlaybookEnd,
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_f64(d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s).ok()))
    }
}
