//! Fuzz target for callback configuration parsing.
//!
//! Feeds arbitrary ansible.cfg text and environment entries through the INI
//! reader and the resolver; neither may panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

use logdna_callback::callback::config::{LogdnaConfig, NativeConfig};

/// Arbitrary configuration sources for fuzzing
#[derive(Debug, Arbitrary)]
struct FuzzSources {
    ini: String,
    env: Vec<(FuzzEnvKey, String)>,
}

/// Environment keys biased towards real option names
#[derive(Debug, Arbitrary)]
enum FuzzEnvKey {
    Known(u8),
    Raw(String),
}

const KNOWN_KEYS: &[&str] = &[
    "LOGDNA_INGESTION_KEY",
    "LOGDNA_APPNAME",
    "LOGDNA_HOST",
    "LOGDNA_ENDPOINT",
    "LOGDNA_TIMEOUT",
    "LOGDNA_DISABLE_LOGLEVELS",
    "LOGDNA_HOSTNAME",
    "LOGDNA_USE_TARGET_HOST_FOR_HOSTNAME",
    "LOGDNA_IP_ADDRESS",
    "LOGDNA_MAC_ADDRESS",
    "LOGDNA_TAGS",
    "LOGDNA_LOG_FORMAT",
    "LOGDNA_IGNORE_STATUS_NAMES",
    "LOGDNA_IGNORE_ACTION_NAMES",
    "LOGDNA_IGNORE_ROLE_NAMES",
    "LOGDNA_IGNORE_PLAY_NAMES",
];

fuzz_target!(|sources: FuzzSources| {
    let ini = format!("[callback_logdna]\n{}", sources.ini);
    let native = NativeConfig::parse(&ini);

    let env: HashMap<String, String> = sources
        .env
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                FuzzEnvKey::Known(i) => KNOWN_KEYS[i as usize % KNOWN_KEYS.len()].to_string(),
                FuzzEnvKey::Raw(raw) => raw,
            };
            (key, value)
        })
        .collect();

    let config = LogdnaConfig::resolve(native.values(), &env);
    assert!(!config.timeout.is_zero());
    let _ = config.validate();
    let _ = format!("{:?}", config);
});
