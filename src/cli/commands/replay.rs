//! Replay command - Forward a recorded event stream
//!
//! Reads one JSON-encoded [`CallbackEvent`] per line and drives the LogDNA
//! callback with it, exactly as a live run would. Malformed lines are logged
//! and skipped; delivery problems never change the exit code.
//!
//! A replay covers a single run: `playbook_end` flushes and closes the
//! transport, so events after it are dropped with a warning.

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use logdna_callback::callback::config::{process_environment, LogdnaConfig};
use logdna_callback::callback::types::CallbackEvent;
use logdna_callback::callback::LogdnaCallback;
use logdna_callback::traits::ExecutionCallback;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Arguments for the replay command
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    /// JSON-lines event file; `-` or omitted reads stdin
    pub input: Option<PathBuf>,
}

/// Counts from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events dispatched to the callback
    pub events: usize,
    /// Lines that could not be parsed
    pub skipped: usize,
}

impl ReplayArgs {
    /// Execute the replay command
    pub async fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let config = ctx.load_config().unwrap_or_else(|e| {
            warn!("{:#}; using environment only", e);
            LogdnaConfig::resolve(&HashMap::new(), &process_environment())
        });
        let callback = LogdnaCallback::new(config);

        let summary = match self.input.as_ref().filter(|path| path.as_os_str() != "-") {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?;
                replay(BufReader::new(file), &callback).await
            }
            None => replay(BufReader::new(tokio::io::stdin()), &callback).await,
        };

        let stats = callback.transport_stats();
        info!(
            "Replayed {} events ({} malformed lines skipped): delivered={} failed={} dropped={}",
            summary.events, summary.skipped, stats.delivered, stats.failed, stats.dropped
        );

        Ok(0)
    }
}

/// Feed every event in `reader` to `callback`, then flush.
///
/// A stream that ends without `playbook_end` is flushed as if it had one.
/// Lines that are not valid UTF-8 count as malformed. A read error stops
/// the replay early but still flushes.
pub async fn replay<R, C>(mut reader: R, callback: &C) -> ReplaySummary
where
    R: AsyncBufRead + Unpin,
    C: ExecutionCallback,
{
    let mut summary = ReplaySummary::default();
    let mut ended = false;
    let mut buf = Vec::new();
    let mut line_number = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => line_number += 1,
            Err(e) => {
                warn!("Stopping replay after line {}: {}", line_number, e);
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", line_number, e);
                summary.skipped += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<CallbackEvent>(line) {
            Ok(event) => {
                ended = matches!(event, CallbackEvent::PlaybookEnd);
                callback.on_event(event).await;
                summary.events += 1;
            }
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", line_number, e);
                summary.skipped += 1;
            }
        }
    }

    if !ended {
        callback.on_playbook_end().await;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use logdna_callback::callback::types::TaskEvent;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionCallback for Recorder {
        async fn on_runner_ok(&self, event: TaskEvent) {
            self.calls.lock().push(format!("ok:{}", event.host));
        }

        async fn on_playbook_end(&self) {
            self.calls.lock().push("end".to_string());
        }
    }

    #[tokio::test]
    async fn test_replay_skips_malformed_lines() {
        let input = concat!(
            r#"{"event":"playbook_start","playbook":"site.yml"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"event":"task_result","action":"ping","status":"ok","host":"web1"}"#,
            "\n",
        );
        let recorder = Recorder::default();

        let summary = replay(BufReader::new(input.as_bytes()), &recorder).await;

        assert_eq!(summary, ReplaySummary { events: 2, skipped: 1 });
        assert_eq!(*recorder.calls.lock(), vec!["ok:web1", "end"]);
    }

    #[tokio::test]
    async fn test_replay_does_not_flush_twice() {
        let input = r#"{"event":"playbook_end"}"#;
        let recorder = Recorder::default();

        replay(BufReader::new(input.as_bytes()), &recorder).await;

        assert_eq!(*recorder.calls.lock(), vec!["end"]);
    }

    #[tokio::test]
    async fn test_replay_skips_invalid_utf8_and_keeps_going() {
        let mut input = Vec::new();
        input.extend_from_slice(
            br#"{"event":"task_result","action":"ping","status":"ok","host":"web1"}"#,
        );
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(
            br#"{"event":"task_result","action":"ping","status":"ok","host":"web2"}"#,
        );
        let recorder = Recorder::default();

        let summary = replay(BufReader::new(input.as_slice()), &recorder).await;

        assert_eq!(summary, ReplaySummary { events: 2, skipped: 1 });
        assert_eq!(*recorder.calls.lock(), vec!["ok:web1", "ok:web2", "end"]);
    }

    struct BrokenReader;

    impl tokio::io::AsyncRead for BrokenReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("disk went away")))
        }
    }

    #[tokio::test]
    async fn test_replay_flushes_after_read_error() {
        let input = concat!(
            r#"{"event":"task_result","action":"ping","status":"ok","host":"web1"}"#,
            "\n",
        );
        let reader = BufReader::new(tokio::io::AsyncReadExt::chain(input.as_bytes(), BrokenReader));
        let recorder = Recorder::default();

        let summary = replay(reader, &recorder).await;

        assert_eq!(summary.events, 1);
        assert_eq!(*recorder.calls.lock(), vec!["ok:web1", "end"]);
    }
}
