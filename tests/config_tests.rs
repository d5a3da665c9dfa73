//! Configuration resolution tests.
//!
//! Covers merging of `ansible.cfg` with `LOGDNA_*` environment variables,
//! config file discovery and loading from disk.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

use logdna_callback::callback::config::{
    process_environment, AddressSetting, LogdnaConfig, NativeConfig,
};

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_cfg(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("ansible.cfg");
    fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_tags_from_environment() {
    let env = map(&[("LOGDNA_TAGS", "prod,web")]);
    let config = LogdnaConfig::resolve(&HashMap::new(), &env);
    assert_eq!(config.tags, vec!["prod", "web"]);
}

#[test]
fn test_every_option_prefers_native() {
    let native = map(&[
        ("logdna_ingestion_key", "cfg-key"),
        ("logdna_appname", "cfg-app"),
        ("logdna_host", "cfg.example.com"),
        ("logdna_endpoint", "/cfg"),
        ("logdna_hostname", "cfg-host"),
        ("logdna_log_format", "{action}"),
        ("logdna_timeout", "9"),
        ("logdna_disable_loglevels", "false"),
    ]);
    let env = map(&[
        ("LOGDNA_INGESTION_KEY", "env-key"),
        ("LOGDNA_APPNAME", "env-app"),
        ("LOGDNA_HOST", "env.example.com"),
        ("LOGDNA_ENDPOINT", "/env"),
        ("LOGDNA_HOSTNAME", "env-host"),
        ("LOGDNA_LOG_FORMAT", "{host}"),
        ("LOGDNA_TIMEOUT", "1"),
        ("LOGDNA_DISABLE_LOGLEVELS", "true"),
    ]);

    let config = LogdnaConfig::resolve(&native, &env);
    assert_eq!(config.ingestion_key.as_deref(), Some("cfg-key"));
    assert_eq!(config.app_name, "cfg-app");
    assert_eq!(config.endpoint_host, "cfg.example.com");
    assert_eq!(config.endpoint_path, "/cfg");
    assert_eq!(config.hostname_override.as_deref(), Some("cfg-host"));
    assert_eq!(config.log_format(), "{action}");
    assert_eq!(config.timeout, Duration::from_secs(9));
    assert!(!config.disable_loglevels);
}

#[test]
fn test_blank_native_value_falls_through_to_env() {
    let native = map(&[("logdna_appname", "  ")]);
    let env = map(&[("LOGDNA_APPNAME", "env-app")]);
    let config = LogdnaConfig::resolve(&native, &env);
    assert_eq!(config.app_name, "env-app");
}

#[test]
fn test_ignore_lists_from_environment() {
    let env = map(&[
        ("LOGDNA_IGNORE_STATUS_NAMES", "skipped, ok"),
        ("LOGDNA_IGNORE_ACTION_NAMES", "Debug"),
    ]);
    let config = LogdnaConfig::resolve(&HashMap::new(), &env);
    assert!(config.ignore_status.matches("OK"));
    assert!(config.ignore_status.matches("skipped"));
    assert!(config.ignore_action.matches("debug"));
    assert!(config.ignore_role.is_empty());
}

#[test]
fn test_address_overrides() {
    let native = map(&[("logdna_ip_address", "disable")]);
    let env = map(&[("LOGDNA_MAC_ADDRESS", "disabled")]);
    let config = LogdnaConfig::resolve(&native, &env);
    assert_eq!(config.ip_address, AddressSetting::Disabled);
    assert_eq!(config.mac_address, AddressSetting::Disabled);
}

// ============================================================================
// Environment Snapshot
// ============================================================================

#[test]
#[serial]
fn test_process_environment_only_keeps_prefix() {
    std::env::set_var("LOGDNA_APPNAME", "from-process");
    std::env::set_var("NOT_LOGDNA_APPNAME", "ignored");

    let env = process_environment();
    assert_eq!(env.get("LOGDNA_APPNAME").map(String::as_str), Some("from-process"));
    assert!(!env.contains_key("NOT_LOGDNA_APPNAME"));

    std::env::remove_var("LOGDNA_APPNAME");
    std::env::remove_var("NOT_LOGDNA_APPNAME");
}

#[test]
#[serial]
fn test_load_merges_file_and_environment() {
    let dir = TempDir::new().unwrap();
    let path = write_cfg(
        &dir,
        "[callback_logdna]\nlogdna_ingestion_key = file-key\nlogdna_tags = from-file\n",
    );
    std::env::set_var("LOGDNA_TAGS", "from-env");
    std::env::set_var("LOGDNA_APPNAME", "env-app");

    let config = LogdnaConfig::load(Some(&path)).unwrap();
    assert_eq!(config.ingestion_key.as_deref(), Some("file-key"));
    assert_eq!(config.tags, vec!["from-file"]);
    assert_eq!(config.app_name, "env-app");

    std::env::remove_var("LOGDNA_TAGS");
    std::env::remove_var("LOGDNA_APPNAME");
}

// ============================================================================
// Native Config Files
// ============================================================================

#[test]
#[serial]
fn test_ansible_config_env_var_is_used() {
    let dir = TempDir::new().unwrap();
    let path = write_cfg(&dir, "[callback_logdna]\nlogdna_appname = via-env-path\n");
    std::env::set_var("ANSIBLE_CONFIG", &path);

    let native = NativeConfig::load(None).unwrap();
    assert_eq!(native.path(), Some(path.as_path()));
    assert_eq!(
        native.values().get("logdna_appname").map(String::as_str),
        Some("via-env-path")
    );

    std::env::remove_var("ANSIBLE_CONFIG");
}

#[test]
fn test_missing_explicit_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let native = NativeConfig::load(Some(&dir.path().join("missing.cfg"))).unwrap();
    assert!(native.values().is_empty());
    assert!(native.path().is_none());
}

#[test]
fn test_unreadable_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    // A directory passes the lookup but cannot be read as a file
    let result = NativeConfig::from_file(dir.path());
    assert!(result.is_err());
}

#[test]
fn test_section_isolation() {
    let dir = TempDir::new().unwrap();
    let path = write_cfg(
        &dir,
        r#"
[defaults]
logdna_appname = defaults-section

[callback_logdna]
logdna_appname = 'quoted-app'
logdna_use_target_host_for_hostname = yes

[callback_other]
logdna_tags = other
"#,
    );

    let native = NativeConfig::from_file(&path).unwrap();
    let config = LogdnaConfig::resolve(native.values(), &HashMap::new());
    assert_eq!(config.app_name, "quoted-app");
    assert!(config.use_target_host_for_hostname);
    assert!(config.tags.is_empty());
}
