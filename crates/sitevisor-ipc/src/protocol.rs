//! IPC Protocol - Request/Response types

use serde::{Deserialize, Serialize};
use sitevisor_core::{Command, CommandInfo, CommandRef, CommandUpdate, Run, Site, SiteUpdate};
use std::collections::BTreeMap;

/// IPC Request from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Check if daemon is alive
    Ping,

    /// Stop the daemon; running commands keep running
    Kill,

    SiteAdd {
        name: String,
        directory: Option<String>,
        base_command: Option<String>,
    },
    SiteEdit {
        name: String,
        update: SiteUpdate,
    },
    SiteList,
    SiteRemove {
        name: String,
    },

    CommandAdd {
        site: String,
        name: String,
        template: String,
        #[serde(default)]
        envs: BTreeMap<String, String>,
        active: bool,
    },
    CommandEdit {
        target: CommandRef,
        update: CommandUpdate,
    },
    /// Replace the whole env set of a command
    CommandEnv {
        target: CommandRef,
        envs: BTreeMap<String, String>,
    },
    CommandList {
        site: Option<String>,
    },
    CommandRemove {
        target: CommandRef,
    },

    Start {
        target: CommandRef,
    },
    Stop {
        target: CommandRef,
    },
    Restart {
        target: CommandRef,
    },
    /// Build the command line without running it
    Preview {
        target: CommandRef,
    },

    /// Tail a command's log
    Logs {
        target: CommandRef,
        lines: Option<usize>,
        grep: Option<String>,
    },

    /// Run history, newest first
    Runs {
        target: CommandRef,
        limit: usize,
    },

    /// Delete a command's log entries
    Flush {
        target: CommandRef,
    },

    /// State of every command
    Status,
}

/// IPC Response from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Ping response
    Pong,

    /// Success with message
    Ok { message: String },

    /// Error with message; `actionable` is false for internal failures
    Error { message: String, actionable: bool },

    Site { site: Site },
    Sites { sites: Vec<Site> },
    Command { site: Site, command: Command },
    Commands { commands: Vec<CommandInfo> },

    /// Start response; `fallback` is set when the fallback line was used
    Started { run: Run, fallback: bool },

    Stopped { count: usize },

    Restarted { run: Run, fallback: bool },

    Preview { line: String },

    LogLines { lines: Vec<String> },

    Runs { runs: Vec<Run> },

    Flushed { count: u64 },

    Deleted { name: String },

    Status { commands: Vec<CommandInfo> },
}

impl Response {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Response::Ok {
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Response::Error {
            message: message.into(),
            actionable: true,
        }
    }

    /// Map a core error, keeping its classification
    pub fn from_error(err: &sitevisor_core::Error) -> Self {
        Response::Error {
            message: err.to_string(),
            actionable: err.is_caller_actionable(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Response::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_wire_format() {
        let req = Request::Start {
            target: CommandRef::Name {
                site: "demo".to_string(),
                command: "worker".to_string(),
            },
        };

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"start","target":{"by":"name","site":"demo","command":"worker"}}"#
        );
    }

    #[test]
    fn test_command_add_without_envs() {
        let json = r#"{"type":"command_add","site":"demo","name":"w","template":"sleep 1","active":true}"#;
        match serde_json::from_str::<Request>(json).unwrap() {
            Request::CommandAdd { envs, active, .. } => {
                assert!(envs.is_empty());
                assert!(active);
            }
            other => panic!("Wrong request type: {:?}", other),
        }
    }

    #[test]
    fn test_site_edit_clears_prefix() {
        let req = Request::SiteEdit {
            name: "demo".to_string(),
            update: SiteUpdate {
                directory: None,
                base_command: Some(None),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        match parsed {
            Request::SiteEdit { update, .. } => assert_eq!(update.base_command, Some(None)),
            _ => panic!("Wrong request type"),
        }
    }

    #[test]
    fn test_error_response_from_core_error() {
        let resp = Response::from_error(&sitevisor_core::Error::db("disk I/O error"));
        assert!(resp.is_error());
        assert_eq!(resp.error_message(), Some("Database error: disk I/O error"));
        match resp {
            Response::Error { actionable, .. } => assert!(!actionable),
            _ => unreachable!(),
        }

        let resp = Response::from_error(&sitevisor_core::Error::AlreadyRunning(
            "demo/worker".to_string(),
        ));
        assert!(matches!(resp, Response::Error { actionable: true, .. }));
    }

    #[test]
    fn test_flushed_response_serialize() {
        let resp = Response::Flushed { count: 3 };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"type":"flushed","count":3}"#);
    }
}
