//! Fuzz target for event decoding and formatting.
//!
//! Decodes arbitrary bytes as a JSON-lines event and formats every task
//! result with an arbitrary template; formatting must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use logdna_callback::callback::config::LogdnaConfig;
use logdna_callback::callback::filter::should_forward;
use logdna_callback::callback::format::{EventFormatter, HostIdentity};
use logdna_callback::callback::types::CallbackEvent;

fuzz_target!(|input: (String, &[u8])| {
    let (template, line) = input;

    let Ok(event) = serde_json::from_slice::<CallbackEvent>(line) else {
        return;
    };

    let config = Arc::new(LogdnaConfig::builder().log_format(template).build());
    let formatter = EventFormatter::with_identity(Arc::clone(&config), HostIdentity::new("fuzz"));

    match event {
        CallbackEvent::TaskResult(task) => {
            let _ = should_forward(&task, &config);
            let record = formatter.format(&task);
            assert_eq!(record.line.trim(), record.line);
            let _ = serde_json::to_vec(&record);
        }
        CallbackEvent::Stats { stats } => {
            let records = formatter.format_stats(Some("fuzz.yml"), &stats);
            assert_eq!(records.len(), stats.len());
        }
        _ => {}
    }
});
