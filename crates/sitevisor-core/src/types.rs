//! Core types for sitevisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Valid site and command names: alphanumeric, underscore, hyphen, dot
static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("Invalid name regex"));

/// Validate a site or command name
pub fn validate_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && NAME_REGEX.is_match(name)
}

/// A deployment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: u32,
    pub name: String,
    /// Working directory every command of this site runs in
    #[serde(default)]
    pub directory: Option<String>,
    /// Trusted prefix prepended to every command of this site
    #[serde(default)]
    pub base_command: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            directory: None,
            base_command: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_directory(mut self, dir: impl Into<String>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn with_base_command(mut self, prefix: impl Into<String>) -> Self {
        self.base_command = Some(prefix.into());
        self
    }
}

/// A templated shell invocation scoped to a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: u32,
    pub site_id: u32,
    pub name: String,
    /// Command line, may reference `{key}` placeholders from `envs`
    pub template: String,
    pub active: bool,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Command {
    pub fn new(site_id: u32, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: 0,
            site_id,
            name: name.into(),
            template: template.into(),
            active: true,
            envs: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// One execution attempt of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: u32,
    pub command_id: u32,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub manually_stopped: bool,
    pub restart_count: u32,
}

impl Run {
    /// A run is live until its stop timestamp is set
    pub fn is_live(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn uptime_secs(&self) -> u64 {
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(Error::db(format!("Unknown log level: {}", s))),
        }
    }
}

/// Append-only log line tied to a site and command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub site_id: Option<u32>,
    pub command_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Supervisor state of a single command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Idle,
    Starting,
    Running,
    Stopping,
    Restarting,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandState::Idle => "idle",
            CommandState::Starting => "starting",
            CommandState::Running => "running",
            CommandState::Stopping => "stopping",
            CommandState::Restarting => "restarting",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, CommandState::Idle)
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an operator addresses a command: numeric id or `site/command`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum CommandRef {
    Id(u32),
    Name { site: String, command: String },
}

impl CommandRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u32>() {
            return Ok(CommandRef::Id(id));
        }
        match s.split_once('/') {
            Some((site, command)) if validate_name(site) && validate_name(command) => {
                Ok(CommandRef::Name {
                    site: site.to_string(),
                    command: command.to_string(),
                })
            }
            _ => Err(Error::InvalidSelector(format!(
                "'{}' (expected <id> or <site>/<command>)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for CommandRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandRef::Id(id) => write!(f, "{}", id),
            CommandRef::Name { site, command } => write!(f, "{}/{}", site, command),
        }
    }
}

/// Fields an operator may change on a site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// `Some(None)` clears the prefix
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub base_command: Option<Option<String>>,
}

/// Keeps an explicit `null` apart from a missing field
fn present_field<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Fields an operator may change on a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandUpdate {
    pub name: Option<String>,
    pub template: Option<String>,
    pub active: Option<bool>,
}

/// Combined view of a command for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub site: Site,
    pub command: Command,
    pub state: CommandState,
    pub latest_run: Option<Run>,
}

impl CommandInfo {
    pub fn new(site: Site, command: Command, state: CommandState, latest_run: Option<Run>) -> Self {
        Self {
            site,
            command,
            state,
            latest_run,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.site.name, self.command.name)
    }
}
