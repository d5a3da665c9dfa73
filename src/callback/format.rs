//! Record formatting for the LogDNA callback.
//!
//! [`EventFormatter`] turns a [`TaskEvent`] into a [`FormattedRecord`]: a
//! rendered log line, an optional severity, the source identity (hostname,
//! IP, MAC) and a metadata object. Formatting is total: missing optional
//! fields render as empty strings and unknown template placeholders are
//! left as written.

use std::collections::HashMap;
use std::fs;
use std::net::UdpSocket;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use super::config::{AddressSetting, LogdnaConfig};
use super::filter::STATS_STATUS;
use super::types::{EventStatus, HostStats, RunStats, TaskEvent};

// ============================================================================
// Severity
// ============================================================================

/// Severity attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warn
    Warn,
    /// Error
    Error,
}

/// Maps event statuses to severities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityPolicy {
    levels: HashMap<EventStatus, Severity>,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        let levels = EventStatus::ALL
            .into_iter()
            .map(|status| {
                let level = match status {
                    EventStatus::Ok | EventStatus::Changed | EventStatus::AsyncOk => {
                        Severity::Info
                    }
                    EventStatus::Skipped => Severity::Warn,
                    EventStatus::Failed | EventStatus::Unreachable | EventStatus::AsyncFailed => {
                        Severity::Error
                    }
                };
                (status, level)
            })
            .collect();
        Self { levels }
    }
}

impl SeverityPolicy {
    /// Override the severity for one status.
    pub fn with_level(mut self, status: EventStatus, level: Severity) -> Self {
        self.levels.insert(status, level);
        self
    }

    /// Severity for a status.
    pub fn level_for(&self, status: EventStatus) -> Severity {
        self.levels.get(&status).copied().unwrap_or(Severity::Info)
    }
}

// ============================================================================
// Log Line Template
// ============================================================================

/// Placeholders understood by the log line template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    /// `{action}`
    Action,
    /// `{changed}`
    Changed,
    /// `{host}`
    Host,
    /// `{playbook}`
    Playbook,
    /// `{role}`
    Role,
    /// `{status}`
    Status,
    /// `{name}`
    Name,
}

impl TemplateField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "action" => Some(TemplateField::Action),
            "changed" => Some(TemplateField::Changed),
            "host" => Some(TemplateField::Host),
            "playbook" => Some(TemplateField::Playbook),
            "role" => Some(TemplateField::Role),
            "status" => Some(TemplateField::Status),
            "name" => Some(TemplateField::Name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(TemplateField),
}

/// A parsed log line template.
///
/// `{{` and `}}` produce literal braces. A placeholder that is not one of
/// the [`TemplateField`] names, including attribute or index syntax such as
/// `{host.name}`, stays in the output as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTemplate {
    segments: Vec<Segment>,
}

impl LogTemplate {
    /// Parse a template. Never fails.
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(idx) = rest.find(['{', '}']) {
            literal.push_str(&rest[..idx]);
            let tail = &rest[idx..];

            if tail.starts_with("{{") {
                literal.push('{');
                rest = &tail[2..];
            } else if tail.starts_with("}}") {
                literal.push('}');
                rest = &tail[2..];
            } else if tail.starts_with('}') {
                literal.push('}');
                rest = &tail[1..];
            } else {
                match tail.find('}') {
                    Some(end) => {
                        let placeholder = &tail[..=end];
                        match TemplateField::from_name(&tail[1..end]) {
                            Some(field) => {
                                if !literal.is_empty() {
                                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                                }
                                segments.push(Segment::Field(field));
                            }
                            None => literal.push_str(placeholder),
                        }
                        rest = &tail[end + 1..];
                    }
                    None => {
                        literal.push_str(tail);
                        rest = "";
                    }
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Render the template; the result is whitespace-trimmed.
    pub fn render(&self, values: &TemplateValues<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&values.get(*field)),
            }
        }
        out.trim().to_string()
    }
}

/// Values substituted into a [`LogTemplate`].
#[derive(Debug, Clone, Default)]
pub struct TemplateValues<'a> {
    /// `{action}`
    pub action: &'a str,
    /// `{changed}`
    pub changed: Option<bool>,
    /// `{host}`
    pub host: &'a str,
    /// `{playbook}`
    pub playbook: Option<&'a str>,
    /// `{role}`
    pub role: Option<&'a str>,
    /// `{status}`
    pub status: &'a str,
    /// `{name}`
    pub name: Option<&'a str>,
}

impl TemplateValues<'_> {
    fn get(&self, field: TemplateField) -> String {
        match field {
            TemplateField::Action => self.action.to_string(),
            TemplateField::Changed => self.changed.map(|c| c.to_string()).unwrap_or_default(),
            TemplateField::Host => self.host.to_string(),
            TemplateField::Playbook => self.playbook.unwrap_or_default().to_string(),
            TemplateField::Role => self.role.unwrap_or_default().to_string(),
            TemplateField::Status => self.status.to_string(),
            TemplateField::Name => self.name.unwrap_or_default().to_string(),
        }
    }
}

// ============================================================================
// Host Identity
// ============================================================================

/// Identity of the control machine, detected once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIdentity {
    /// Control machine hostname
    pub hostname: String,
    /// Primary IPv4 address, if detected
    pub ip: Option<String>,
    /// Hardware address, if detected
    pub mac: Option<String>,
    /// User running the tool
    pub user: Option<String>,
}

impl HostIdentity {
    /// Create an identity with explicit values.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Set the IP address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the MAC address.
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Detect the identity from the local system. Each field is best-effort.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let hostname = hostname
            .strip_suffix(".local")
            .map(String::from)
            .unwrap_or(hostname);

        let identity = Self {
            hostname,
            ip: detect_ip(),
            mac: detect_mac(),
            user: ["USER", "LOGNAME", "USERNAME"]
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty())),
        };
        debug!(
            "Detected control node identity: host={} ip={:?} mac={:?}",
            identity.hostname, identity.ip, identity.mac
        );
        identity
    }
}

/// Address of the interface holding the default route.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
fn detect_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(("10.255.255.255", 1)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() {
        None
    } else {
        Some(ip.to_string())
    }
}

/// First non-loopback interface with a real hardware address (Linux only).
fn detect_mac() -> Option<String> {
    let mut interfaces: Vec<_> = fs::read_dir("/sys/class/net")
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    interfaces.sort();

    interfaces
        .into_iter()
        .filter(|path| path.file_name().is_some_and(|name| name != "lo"))
        .filter_map(|path| fs::read_to_string(path.join("address")).ok())
        .map(|addr| addr.trim().to_lowercase())
        .find(|addr| !addr.is_empty() && addr != "00:00:00:00:00:00")
}

// ============================================================================
// Formatted Record
// ============================================================================

/// One log line ready for delivery.
///
/// Serializes to a single entry of the ingestion API's `lines` array;
/// `hostname` and `tags` travel as request parameters instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedRecord {
    /// Rendered log line
    pub line: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Application name
    pub app: String,
    /// Severity, omitted when levels are disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Severity>,
    /// Source IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Source MAC address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Structured metadata
    pub meta: JsonValue,
    /// Source hostname
    #[serde(skip)]
    pub hostname: String,
    /// Tags for the record
    #[serde(skip)]
    pub tags: Vec<String>,
}

// ============================================================================
// Event Formatter
// ============================================================================

/// Formats events into records according to the run configuration.
#[derive(Debug, Clone)]
pub struct EventFormatter {
    config: Arc<LogdnaConfig>,
    template: LogTemplate,
    severity: SeverityPolicy,
    identity: HostIdentity,
    session: String,
}

impl EventFormatter {
    /// Create a formatter, detecting the control node identity.
    pub fn new(config: Arc<LogdnaConfig>) -> Self {
        Self::with_identity(config, HostIdentity::detect())
    }

    /// Create a formatter with a known identity.
    pub fn with_identity(config: Arc<LogdnaConfig>, identity: HostIdentity) -> Self {
        Self {
            template: LogTemplate::parse(config.log_format()),
            config,
            severity: SeverityPolicy::default(),
            identity,
            session: Uuid::new_v4().to_string(),
        }
    }

    /// Replace the severity policy.
    pub fn with_severity_policy(mut self, policy: SeverityPolicy) -> Self {
        self.severity = policy;
        self
    }

    /// Session identifier shared by all records of this run.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// The detected or injected control node identity.
    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// Format a task event.
    pub fn format(&self, event: &TaskEvent) -> FormattedRecord {
        let changed = event.changed();
        let line = self.template.render(&TemplateValues {
            action: &event.action,
            changed,
            host: &event.host,
            playbook: event.playbook.as_deref(),
            role: event.role.as_deref(),
            status: event.status.as_str(),
            name: event.task_name.as_deref(),
        });

        let mut meta = self.base_meta();
        meta.insert("ansible_changed".into(), json!(changed));
        meta.insert("ansible_check_mode".into(), json!(event.check_mode));
        meta.insert("ansible_host".into(), json!(event.host));
        meta.insert("ansible_playbook".into(), json!(event.playbook));
        meta.insert("ansible_result".into(), event.result.clone());
        meta.insert("ansible_role".into(), json!(event.role));
        meta.insert("ansible_status".into(), json!(event.status.as_str()));
        meta.insert(
            "ansible_task".into(),
            json!({ "action": event.action, "name": event.task_name }),
        );
        meta.insert(
            "ansible_execution_time".into(),
            json!(event.duration.map(|d| d.as_secs_f64())),
        );
        meta.insert("uuid".into(), json!(event.task_uuid));

        self.record(
            line,
            self.timestamp_for(event),
            self.level(self.severity.level_for(event.status)),
            self.hostname_for(Some(&event.host)),
            meta,
        )
    }

    /// Format one summary record per host from end-of-run statistics.
    pub fn format_stats(&self, playbook: Option<&str>, stats: &RunStats) -> Vec<FormattedRecord> {
        stats
            .iter()
            .map(|(host, counts)| {
                let line = format!(
                    "status={} play={} host={} ok={} changed={} failures={} unreachable={} skipped={} rescued={} ignored={}",
                    STATS_STATUS,
                    playbook.unwrap_or_default(),
                    host,
                    counts.ok,
                    counts.changed,
                    counts.failures,
                    counts.unreachable,
                    counts.skipped,
                    counts.rescued,
                    counts.ignored
                );

                let mut meta = self.base_meta();
                meta.insert("ansible_host".into(), json!(host));
                meta.insert("ansible_playbook".into(), json!(playbook));
                meta.insert("ansible_status".into(), json!(STATS_STATUS));
                meta.insert("ansible_stats".into(), json!(counts));

                self.record(
                    line,
                    now_iso8601(),
                    self.level(self.stats_severity(counts)),
                    self.hostname_for(Some(host)),
                    meta,
                )
            })
            .collect()
    }

    fn stats_severity(&self, counts: &HostStats) -> Severity {
        if counts.failures > 0 {
            self.severity.level_for(EventStatus::Failed)
        } else if counts.unreachable > 0 {
            self.severity.level_for(EventStatus::Unreachable)
        } else {
            self.severity.level_for(EventStatus::Ok)
        }
    }

    fn level(&self, severity: Severity) -> Option<Severity> {
        (!self.config.disable_loglevels).then_some(severity)
    }

    fn record(
        &self,
        line: String,
        timestamp: String,
        level: Option<Severity>,
        hostname: String,
        mut meta: Map<String, JsonValue>,
    ) -> FormattedRecord {
        meta.insert("app".into(), json!(self.config.app_name));
        meta.insert("tags".into(), json!(self.config.tags));

        FormattedRecord {
            line,
            timestamp,
            app: self.config.app_name.clone(),
            level,
            ip: resolve_address(&self.config.ip_address, self.identity.ip.as_deref()),
            mac: resolve_address(&self.config.mac_address, self.identity.mac.as_deref()),
            meta: prune_empty(JsonValue::Object(meta)),
            hostname,
            tags: self.config.tags.clone(),
        }
    }

    fn base_meta(&self) -> Map<String, JsonValue> {
        let mut meta = Map::new();
        meta.insert("ansible_session".into(), json!(self.session));
        meta.insert("system_host".into(), json!(self.identity.hostname));
        meta.insert("system_ip".into(), json!(self.identity.ip));
        meta.insert("system_user".into(), json!(self.identity.user));
        meta
    }

    /// Managed node, then explicit override, then control node.
    fn hostname_for(&self, target: Option<&str>) -> String {
        if self.config.use_target_host_for_hostname {
            if let Some(target) = target.filter(|t| !t.is_empty()) {
                return target.to_string();
            }
        }
        self.config
            .hostname_override
            .clone()
            .unwrap_or_else(|| self.identity.hostname.clone())
    }

    /// Prefer the managed node's own clock when facts were gathered.
    fn timestamp_for(&self, event: &TaskEvent) -> String {
        event
            .result
            .pointer("/ansible_facts/ansible_date_time/iso8601")
            .and_then(JsonValue::as_str)
            .map(String::from)
            .unwrap_or_else(|| iso8601(event.timestamp))
    }
}

fn resolve_address(setting: &AddressSetting, detected: Option<&str>) -> Option<String> {
    match setting {
        AddressSetting::Auto => detected.map(String::from),
        AddressSetting::Disabled => None,
        AddressSetting::Fixed(value) => Some(value.clone()),
    }
}

fn iso8601(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_iso8601() -> String {
    iso8601(Utc::now())
}

/// Recursively drop nulls, empty strings and empty containers.
pub fn prune_empty(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, prune_empty(v)))
                .filter(|(_, v)| !is_empty_value(v))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(prune_empty)
                .filter(|v| !is_empty_value(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}
