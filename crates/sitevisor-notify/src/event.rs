//! Command event types for notifications

use serde::{Deserialize, Serialize};

/// Events that can trigger notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandEvent {
    /// Command started by an operator
    Started {
        site: String,
        command: String,
        pid: u32,
    },

    /// Command stopped by an operator
    Stopped { site: String, command: String },

    /// Command died without being stopped and is about to restart
    Crashed {
        site: String,
        command: String,
        exit_code: Option<i32>,
    },

    /// Automatic restarts exhausted
    GaveUp {
        site: String,
        command: String,
        restarts: u32,
    },
}

/// Event names accepted in the `events` filter
pub const VALID_EVENTS: &[&str] = &["crash", "gave_up", "started", "stopped"];

impl CommandEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CommandEvent::Started { .. } => "started",
            CommandEvent::Stopped { .. } => "stopped",
            CommandEvent::Crashed { .. } => "crash",
            CommandEvent::GaveUp { .. } => "gave_up",
        }
    }

    /// Human-readable message for the webhook body
    pub fn format_message(&self) -> String {
        match self {
            CommandEvent::Started { site, command, pid } => {
                format!("Command '{}' on site '{}' started (pid {}).", command, site, pid)
            }
            CommandEvent::Stopped { site, command } => {
                format!("Command '{}' on site '{}' was stopped.", command, site)
            }
            CommandEvent::Crashed {
                site,
                command,
                exit_code,
            } => {
                let code = exit_code
                    .map(|c| format!(" Exit code: {}.", c))
                    .unwrap_or_default();
                format!(
                    "Command '{}' on site '{}' died unexpectedly and will be restarted.{}",
                    command, site, code
                )
            }
            CommandEvent::GaveUp {
                site,
                command,
                restarts,
            } => format!(
                "Command '{}' on site '{}' keeps crashing; giving up after {} restarts.",
                command, site, restarts
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_message() {
        let event = CommandEvent::Crashed {
            site: "demo".to_string(),
            command: "worker".to_string(),
            exit_code: None,
        };
        assert_eq!(
            event.format_message(),
            "Command 'worker' on site 'demo' died unexpectedly and will be restarted."
        );

        let event = CommandEvent::Crashed {
            site: "demo".to_string(),
            command: "worker".to_string(),
            exit_code: Some(137),
        };
        assert!(event.format_message().ends_with("Exit code: 137."));
    }

    #[test]
    fn test_event_types_are_valid_filters() {
        let events = [
            CommandEvent::Started {
                site: "s".into(),
                command: "c".into(),
                pid: 1,
            },
            CommandEvent::Stopped {
                site: "s".into(),
                command: "c".into(),
            },
            CommandEvent::Crashed {
                site: "s".into(),
                command: "c".into(),
                exit_code: Some(1),
            },
            CommandEvent::GaveUp {
                site: "s".into(),
                command: "c".into(),
                restarts: 15,
            },
        ];
        for event in &events {
            assert!(VALID_EVENTS.contains(&event.event_type()));
        }
    }
}
