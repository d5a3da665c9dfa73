//! Event filtering for the LogDNA callback.
//!
//! An event is suppressed when any one of the four ignore lists matches it:
//! status, action, role or playbook. All comparisons ignore case, and events
//! without a role or playbook never match the corresponding list.

use std::fmt;
use std::path::Path;

use super::config::LogdnaConfig;
use super::types::TaskEvent;

/// Status reported for end-of-run statistics records.
pub const STATS_STATUS: &str = "stats";

/// Which ignore list suppressed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Matched `ignore_status`
    Status,
    /// Matched `ignore_action`
    Action,
    /// Matched `ignore_role`
    Role,
    /// Matched `ignore_play`
    Play,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Status => write!(f, "status"),
            IgnoreReason::Action => write!(f, "action"),
            IgnoreReason::Role => write!(f, "role"),
            IgnoreReason::Play => write!(f, "play"),
        }
    }
}

/// Returns true if the event should be forwarded.
pub fn should_forward(event: &TaskEvent, config: &LogdnaConfig) -> bool {
    ignore_reason(event, config).is_none()
}

/// The first ignore list that matches the event, if any.
pub fn ignore_reason(event: &TaskEvent, config: &LogdnaConfig) -> Option<IgnoreReason> {
    if config.ignore_status.matches(event.status.as_str()) {
        return Some(IgnoreReason::Status);
    }
    if config.ignore_action.matches(&event.action) {
        return Some(IgnoreReason::Action);
    }
    if event
        .role
        .as_deref()
        .is_some_and(|role| config.ignore_role.matches(role))
    {
        return Some(IgnoreReason::Role);
    }
    if event
        .playbook
        .as_deref()
        .is_some_and(|playbook| playbook_matches(playbook, config))
    {
        return Some(IgnoreReason::Play);
    }
    None
}

/// Returns true if end-of-run statistics for `playbook` should be forwarded.
///
/// Statistics carry the status `stats` and are subject to the status and
/// playbook lists only.
pub fn should_forward_stats(playbook: Option<&str>, config: &LogdnaConfig) -> bool {
    if config.ignore_status.matches(STATS_STATUS) {
        return false;
    }
    !playbook.is_some_and(|playbook| playbook_matches(playbook, config))
}

/// Playbooks are listed by file name, but events may carry a full path.
fn playbook_matches(playbook: &str, config: &LogdnaConfig) -> bool {
    if config.ignore_play.matches(playbook) {
        return true;
    }
    Path::new(playbook)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| config.ignore_play.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::types::EventStatus;

    #[test]
    fn test_empty_lists_forward_everything() {
        let config = LogdnaConfig::default();
        for status in EventStatus::ALL {
            let event = TaskEvent::new("shell", status, "web1");
            assert!(should_forward(&event, &config));
        }
    }

    #[test]
    fn test_ignored_action_drops_event() {
        let config = LogdnaConfig::builder().ignore_action(["shell"]).build();
        let event = TaskEvent::new("shell", EventStatus::Failed, "web1").with_role("nginx");

        assert!(!should_forward(&event, &config));
        assert_eq!(ignore_reason(&event, &config), Some(IgnoreReason::Action));
    }

    #[test]
    fn test_status_match_ignores_case() {
        let config = LogdnaConfig::builder().ignore_status(["SKIPPED"]).build();
        let skipped = TaskEvent::new("debug", EventStatus::Skipped, "web1");
        let ok = TaskEvent::new("debug", EventStatus::Ok, "web1");

        assert!(!should_forward(&skipped, &config));
        assert!(should_forward(&ok, &config));
    }

    #[test]
    fn test_missing_role_and_playbook_never_match() {
        let config = LogdnaConfig::builder()
            .ignore_role(["nginx"])
            .ignore_play(["site.yml"])
            .build();
        let event = TaskEvent::new("copy", EventStatus::Ok, "web1");

        assert!(should_forward(&event, &config));
    }

    #[test]
    fn test_playbook_matches_basename() {
        let config = LogdnaConfig::builder().ignore_play(["Site.yml"]).build();
        let event =
            TaskEvent::new("copy", EventStatus::Ok, "web1").with_playbook("/srv/deploy/site.yml");

        assert_eq!(ignore_reason(&event, &config), Some(IgnoreReason::Play));
    }

    #[test]
    fn test_stats_filtering() {
        let config = LogdnaConfig::default();
        assert!(should_forward_stats(Some("site.yml"), &config));
        assert!(should_forward_stats(None, &config));

        let config = LogdnaConfig::builder().ignore_status(["stats"]).build();
        assert!(!should_forward_stats(Some("site.yml"), &config));

        let config = LogdnaConfig::builder().ignore_play(["site.yml"]).build();
        assert!(!should_forward_stats(Some("site.yml"), &config));
        assert!(should_forward_stats(Some("other.yml"), &config));
    }

    #[test]
    fn test_role_match() {
        let config = LogdnaConfig::builder().ignore_role(["redis"]).build();
        let event = TaskEvent::new("apt", EventStatus::Changed, "db1").with_role("Redis");

        assert_eq!(ignore_reason(&event, &config), Some(IgnoreReason::Role));
    }
}
