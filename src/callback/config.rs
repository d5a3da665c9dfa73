//! LogDNA Callback Configuration
//!
//! Configuration is merged once, at callback construction, from two sources
//! with the following precedence (highest first):
//!
//! 1. The `[callback_logdna]` section of the active `ansible.cfg`
//! 2. `LOGDNA_*` environment variables
//! 3. Built-in defaults
//!
//! The result is an immutable [`LogdnaConfig`] that is shared behind an `Arc`
//! for the rest of the run.
//!
//! # Configuration File Format
//!
//! ```ini
//! [callback_logdna]
//! logdna_ingestion_key = ffffffffffffffffffffffffffffffffff
//! logdna_tags = example_tag1,example_tag2
//! logdna_appname = example_ansible_project
//! logdna_log_format = action={action} changed={changed} host={host} {name}
//! logdna_ignore_status_names = skipped
//! ```
//!
//! # Environment Variables
//!
//! - `LOGDNA_INGESTION_KEY` - Ingestion key (required for any forwarding)
//! - `LOGDNA_APPNAME` - Application name (default: "Ansible")
//! - `LOGDNA_HOST` - Ingestion host (default: "logs.logdna.com")
//! - `LOGDNA_ENDPOINT` - Ingestion path (default: "/logs/ingest")
//! - `LOGDNA_TIMEOUT` - Request timeout in seconds (default: 5)
//! - `LOGDNA_DISABLE_LOGLEVELS` - Omit severity levels (true/false)
//! - `LOGDNA_HOSTNAME` - Source hostname override
//! - `LOGDNA_USE_TARGET_HOST_FOR_HOSTNAME` - Use the managed node as hostname
//! - `LOGDNA_IP_ADDRESS` / `LOGDNA_MAC_ADDRESS` - Address overrides, or
//!   `disable` to omit them
//! - `LOGDNA_TAGS` - Comma-separated tags
//! - `LOGDNA_LOG_FORMAT` - Log line template
//! - `LOGDNA_IGNORE_{STATUS,ACTION,ROLE,PLAY}_NAMES` - Comma-separated ignore lists
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use logdna_callback::callback::config::{LogdnaConfig, NativeConfig};
//!
//! let native = NativeConfig::load(None)?;
//! let config = LogdnaConfig::resolve(native.values(), &process_environment());
//! if !config.is_enabled() {
//!     println!("forwarding disabled");
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Prefix shared by all environment variables.
pub const ENV_PREFIX: &str = "LOGDNA_";

/// `ansible.cfg` section holding the callback options.
pub const CONFIG_SECTION: &str = "callback_logdna";

/// Default ingestion host.
pub const DEFAULT_ENDPOINT_HOST: &str = "logs.logdna.com";

/// Default ingestion resource path.
pub const DEFAULT_ENDPOINT_PATH: &str = "/logs/ingest";

/// Default application name shown in the log viewer.
pub const DEFAULT_APP_NAME: &str = "Ansible";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default log line template.
pub const DEFAULT_LOG_FORMAT: &str =
    "status={status} action={action} changed={changed} play={playbook} role={role} host={host} name={name}";

const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Option Table
// ============================================================================

/// A single option: its `ansible.cfg` keys and environment variable suffix.
struct ConfigOption {
    native_keys: &'static [&'static str],
    env: &'static str,
}

const INGESTION_KEY: ConfigOption = ConfigOption {
    native_keys: &["logdna_ingestion_key"],
    env: "INGESTION_KEY",
};
const APPNAME: ConfigOption = ConfigOption {
    native_keys: &["logdna_appname"],
    env: "APPNAME",
};
const HOST: ConfigOption = ConfigOption {
    native_keys: &["logdna_host"],
    env: "HOST",
};
const ENDPOINT: ConfigOption = ConfigOption {
    native_keys: &["logdna_endpoint"],
    env: "ENDPOINT",
};
const TIMEOUT: ConfigOption = ConfigOption {
    native_keys: &["logdna_timeout"],
    env: "TIMEOUT",
};
const DISABLE_LOGLEVELS: ConfigOption = ConfigOption {
    native_keys: &["logdna_disable_loglevels"],
    env: "DISABLE_LOGLEVELS",
};
const HOSTNAME: ConfigOption = ConfigOption {
    native_keys: &["logdna_hostname"],
    env: "HOSTNAME",
};
const USE_TARGET_HOST: ConfigOption = ConfigOption {
    native_keys: &["logdna_use_target_host_for_hostname"],
    env: "USE_TARGET_HOST_FOR_HOSTNAME",
};
const IP_ADDRESS: ConfigOption = ConfigOption {
    native_keys: &["logdna_ip_address"],
    env: "IP_ADDRESS",
};
const MAC_ADDRESS: ConfigOption = ConfigOption {
    native_keys: &["logdna_mac_address"],
    env: "MAC_ADDRESS",
};
const TAGS: ConfigOption = ConfigOption {
    native_keys: &["logdna_tags"],
    env: "TAGS",
};
const LOG_FORMAT: ConfigOption = ConfigOption {
    native_keys: &["logdna_log_format"],
    env: "LOG_FORMAT",
};
const IGNORE_STATUS: ConfigOption = ConfigOption {
    native_keys: &["logdna_ignore_status_names"],
    env: "IGNORE_STATUS_NAMES",
};
const IGNORE_ACTION: ConfigOption = ConfigOption {
    native_keys: &["logdna_ignore_action_names"],
    env: "IGNORE_ACTION_NAMES",
};
// Older ansible.cfg files use the conf_ prefix for these two keys.
const IGNORE_ROLE: ConfigOption = ConfigOption {
    native_keys: &["logdna_ignore_role_names", "conf_ignore_role_names"],
    env: "IGNORE_ROLE_NAMES",
};
const IGNORE_PLAY: ConfigOption = ConfigOption {
    native_keys: &["logdna_ignore_play_names", "conf_ignore_play_names"],
    env: "IGNORE_PLAY_NAMES",
};

/// Two-source lookup with native config taking precedence.
///
/// Blank values count as unset in both sources.
struct Sources<'a> {
    native: &'a HashMap<String, String>,
    env: &'a HashMap<String, String>,
}

impl<'a> Sources<'a> {
    fn get(&self, option: &ConfigOption) -> Option<&'a str> {
        let native = option
            .native_keys
            .iter()
            .find_map(|key| non_blank(self.native.get(*key)));
        native.or_else(|| non_blank(self.env.get(&format!("{}{}", ENV_PREFIX, option.env))))
    }

    fn string(&self, option: &ConfigOption) -> Option<String> {
        self.get(option).map(|v| v.trim().to_string())
    }

    fn flag(&self, option: &ConfigOption) -> bool {
        self.get(option).is_some_and(is_truthy)
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Returns true for the accepted truthy spellings: true, 1, yes, on.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

// ============================================================================
// Value Types
// ============================================================================

/// A case-insensitive set of names to suppress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    names: BTreeSet<String>,
}

impl IgnoreList {
    /// Parse a comma-separated list.
    pub fn parse(value: &str) -> Self {
        split_list(value).into_iter().collect()
    }

    /// Returns true if `name` is in the list, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        !self.names.is_empty() && self.names.contains(&name.trim().to_lowercase())
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate the (lowercased) names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

/// How a network address is attached to records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressSetting {
    /// Detect from the local network stack
    #[default]
    Auto,
    /// Never attach the field
    Disabled,
    /// Use this value
    Fixed(String),
}

impl AddressSetting {
    /// Parse an override; values starting with `disable` turn the field off.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.to_ascii_lowercase().starts_with("disable") {
            AddressSetting::Disabled
        } else {
            AddressSetting::Fixed(value.to_string())
        }
    }
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Resolved, read-only configuration for one run.
#[derive(Clone, PartialEq)]
pub struct LogdnaConfig {
    /// Ingestion key; `None` disables forwarding entirely
    pub ingestion_key: Option<String>,
    /// Ingestion host, optionally with an explicit scheme
    pub endpoint_host: String,
    /// Ingestion resource path
    pub endpoint_path: String,
    /// Application name shown in the log viewer
    pub app_name: String,
    /// Source hostname override
    pub hostname_override: Option<String>,
    /// IP address attached to records
    pub ip_address: AddressSetting,
    /// MAC address attached to records
    pub mac_address: AddressSetting,
    /// Tags attached to every record, in configured order
    pub tags: Vec<String>,
    /// Custom log line template
    pub log_format: Option<String>,
    /// Statuses to suppress
    pub ignore_status: IgnoreList,
    /// Actions to suppress
    pub ignore_action: IgnoreList,
    /// Roles to suppress
    pub ignore_role: IgnoreList,
    /// Playbooks to suppress
    pub ignore_play: IgnoreList,
    /// Omit severity levels from records
    pub disable_loglevels: bool,
    /// Use the managed node rather than the control node as hostname
    pub use_target_host_for_hostname: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum records waiting for delivery
    pub queue_capacity: usize,
    /// Maximum records per request
    pub batch_size: usize,
    /// Retries per batch after the first attempt
    pub max_retries: u32,
    /// Upper bound on the shutdown flush
    pub flush_timeout: Duration,
}

impl Default for LogdnaConfig {
    fn default() -> Self {
        Self {
            ingestion_key: None,
            endpoint_host: DEFAULT_ENDPOINT_HOST.to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            hostname_override: None,
            ip_address: AddressSetting::Auto,
            mac_address: AddressSetting::Auto,
            tags: Vec::new(),
            log_format: None,
            ignore_status: IgnoreList::default(),
            ignore_action: IgnoreList::default(),
            ignore_role: IgnoreList::default(),
            ignore_play: IgnoreList::default(),
            disable_loglevels: false,
            use_target_host_for_hostname: false,
            timeout: DEFAULT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

impl fmt::Debug for LogdnaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogdnaConfig")
            .field(
                "ingestion_key",
                &self.ingestion_key.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint_host", &self.endpoint_host)
            .field("endpoint_path", &self.endpoint_path)
            .field("app_name", &self.app_name)
            .field("hostname_override", &self.hostname_override)
            .field("ip_address", &self.ip_address)
            .field("mac_address", &self.mac_address)
            .field("tags", &self.tags)
            .field("log_format", &self.log_format)
            .field("ignore_status", &self.ignore_status)
            .field("ignore_action", &self.ignore_action)
            .field("ignore_role", &self.ignore_role)
            .field("ignore_play", &self.ignore_play)
            .field("disable_loglevels", &self.disable_loglevels)
            .field(
                "use_target_host_for_hostname",
                &self.use_target_host_for_hostname,
            )
            .field("timeout", &self.timeout)
            .field("queue_capacity", &self.queue_capacity)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

impl LogdnaConfig {
    /// Create a new configuration builder.
    pub fn builder() -> LogdnaConfigBuilder {
        LogdnaConfigBuilder::default()
    }

    /// Merge native config and environment into a configuration.
    ///
    /// Pure over its two inputs: no file or network access happens here.
    pub fn resolve(native: &HashMap<String, String>, env: &HashMap<String, String>) -> Self {
        let sources = Sources { native, env };
        let defaults = Self::default();

        let timeout = sources
            .get(&TIMEOUT)
            .and_then(|raw| match raw.trim().parse::<f64>().map(Duration::try_from_secs_f64) {
                Ok(Ok(timeout)) if !timeout.is_zero() => Some(timeout),
                _ => {
                    warn!("Ignoring invalid LogDNA timeout '{}', using default", raw);
                    None
                }
            })
            .unwrap_or(defaults.timeout);

        Self {
            ingestion_key: sources.string(&INGESTION_KEY),
            endpoint_host: sources.string(&HOST).unwrap_or(defaults.endpoint_host),
            endpoint_path: sources.string(&ENDPOINT).unwrap_or(defaults.endpoint_path),
            app_name: sources.string(&APPNAME).unwrap_or(defaults.app_name),
            hostname_override: sources.string(&HOSTNAME),
            ip_address: sources
                .get(&IP_ADDRESS)
                .map(AddressSetting::parse)
                .unwrap_or_default(),
            mac_address: sources
                .get(&MAC_ADDRESS)
                .map(AddressSetting::parse)
                .unwrap_or_default(),
            tags: sources.get(&TAGS).map(split_list).unwrap_or_default(),
            log_format: sources.get(&LOG_FORMAT).map(String::from),
            ignore_status: sources
                .get(&IGNORE_STATUS)
                .map(IgnoreList::parse)
                .unwrap_or_default(),
            ignore_action: sources
                .get(&IGNORE_ACTION)
                .map(IgnoreList::parse)
                .unwrap_or_default(),
            ignore_role: sources
                .get(&IGNORE_ROLE)
                .map(IgnoreList::parse)
                .unwrap_or_default(),
            ignore_play: sources
                .get(&IGNORE_PLAY)
                .map(IgnoreList::parse)
                .unwrap_or_default(),
            disable_loglevels: sources.flag(&DISABLE_LOGLEVELS),
            use_target_host_for_hostname: sources.flag(&USE_TARGET_HOST),
            timeout,
            ..defaults
        }
    }

    /// Load `ansible.cfg` from the standard locations and merge it with the
    /// process environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let native = NativeConfig::load(explicit_path)?;
        Ok(Self::resolve(native.values(), &process_environment()))
    }

    /// Returns true when an ingestion key is present.
    pub fn is_enabled(&self) -> bool {
        self.ingestion_key.is_some()
    }

    /// The log line template in effect.
    pub fn log_format(&self) -> &str {
        self.log_format.as_deref().unwrap_or(DEFAULT_LOG_FORMAT)
    }

    /// Check transport tuning values.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_host.trim().is_empty() {
            return Err(Error::invalid_config("endpoint_host", "must not be empty"));
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(Error::invalid_config(
                "endpoint_path",
                "must start with '/'",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_config("queue_capacity", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for LogdnaConfig.
#[derive(Debug, Default)]
pub struct LogdnaConfigBuilder {
    config: LogdnaConfig,
}

impl LogdnaConfigBuilder {
    /// Set the ingestion key.
    pub fn ingestion_key(mut self, key: impl Into<String>) -> Self {
        self.config.ingestion_key = Some(key.into());
        self
    }

    /// Set the ingestion host (optionally with an `http://` or `https://` scheme).
    pub fn endpoint_host(mut self, host: impl Into<String>) -> Self {
        self.config.endpoint_host = host.into();
        self
    }

    /// Set the ingestion path.
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, app: impl Into<String>) -> Self {
        self.config.app_name = app.into();
        self
    }

    /// Set the hostname override.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname_override = Some(hostname.into());
        self
    }

    /// Set the IP address setting.
    pub fn ip_address(mut self, setting: AddressSetting) -> Self {
        self.config.ip_address = setting;
        self
    }

    /// Set the MAC address setting.
    pub fn mac_address(mut self, setting: AddressSetting) -> Self {
        self.config.mac_address = setting;
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.config.tags.push(tag.into());
        self
    }

    /// Set the log line template.
    pub fn log_format(mut self, format: impl Into<String>) -> Self {
        self.config.log_format = Some(format.into());
        self
    }

    /// Set the statuses to suppress.
    pub fn ignore_status<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.config.ignore_status = names.into_iter().collect();
        self
    }

    /// Set the actions to suppress.
    pub fn ignore_action<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.config.ignore_action = names.into_iter().collect();
        self
    }

    /// Set the roles to suppress.
    pub fn ignore_role<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.config.ignore_role = names.into_iter().collect();
        self
    }

    /// Set the playbooks to suppress.
    pub fn ignore_play<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.config.ignore_play = names.into_iter().collect();
        self
    }

    /// Enable or disable severity levels.
    pub fn disable_loglevels(mut self, disable: bool) -> Self {
        self.config.disable_loglevels = disable;
        self
    }

    /// Use the managed node as the record hostname.
    pub fn use_target_host_for_hostname(mut self, enabled: bool) -> Self {
        self.config.use_target_host_for_hostname = enabled;
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the delivery queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the maximum records per request.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the retries per batch.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the shutdown flush bound.
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LogdnaConfig {
        self.config
    }
}

// ============================================================================
// Native Configuration (ansible.cfg)
// ============================================================================

/// Raw key/value pairs from the `[callback_logdna]` section of `ansible.cfg`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeConfig {
    path: Option<PathBuf>,
    values: HashMap<String, String>,
}

impl NativeConfig {
    /// Load the first `ansible.cfg` found in the standard locations.
    ///
    /// A missing file is not an error: the section is simply empty.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let paths = Self::candidate_paths(
            explicit_path,
            env::var_os("ANSIBLE_CONFIG").map(PathBuf::from),
            dirs::home_dir(),
        );

        match paths.into_iter().find(|path| path.is_file()) {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("No ansible.cfg found, using environment and defaults only");
                Ok(Self::default())
            }
        }
    }

    /// The lookup order for `ansible.cfg`; the first existing file wins.
    pub fn candidate_paths(
        explicit_path: Option<&Path>,
        ansible_config: Option<PathBuf>,
        home: Option<PathBuf>,
    ) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = Vec::new();
        if let Some(path) = ansible_config {
            paths.push(path);
        }
        paths.push(PathBuf::from("ansible.cfg"));
        if let Some(home) = home {
            paths.push(home.join(".ansible.cfg"));
        }
        paths.push(PathBuf::from("/etc/ansible/ansible.cfg"));
        paths
    }

    /// Read the callback section from a specific file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded LogDNA callback options from {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::parse(&content)
        })
    }

    /// Parse INI content, keeping only the `[callback_logdna]` section.
    pub fn parse(content: &str) -> Self {
        let mut values = HashMap::new();
        let mut in_section = false;

        for line in content.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                in_section = line[1..line.len() - 1].trim() == CONFIG_SECTION;
                continue;
            }

            if !in_section {
                continue;
            }

            let split_at = match (line.find('='), line.find(':')) {
                (Some(eq), Some(colon)) => Some(eq.min(colon)),
                (eq, colon) => eq.or(colon),
            };
            if let Some(idx) = split_at {
                let key = line[..idx].trim().to_lowercase();
                let value = unquote(line[idx + 1..].trim());
                if !key.is_empty() {
                    values.insert(key, value.to_string());
                }
            }
        }

        Self { path: None, values }
    }

    /// The file these values came from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The raw section values, keyed by lowercased option name.
    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Snapshot the `LOGDNA_*` variables of the current process.
pub fn process_environment() -> HashMap<String, String> {
    env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}
