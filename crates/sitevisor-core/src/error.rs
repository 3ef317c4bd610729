//! Error types for sitevisor

use std::path::PathBuf;

/// sitevisor error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Site already exists: {0}")]
    SiteAlreadyExists(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command already exists: {0}")]
    CommandAlreadyExists(String),

    #[error("Command is inactive: {0}")]
    CommandInactive(String),

    #[error("Command already running: {0}")]
    AlreadyRunning(String),

    #[error("Executable not found: {program} (command: {command_line})")]
    ExecutableNotFound {
        program: String,
        command_line: String,
    },

    #[error("Process failed to start: {0}")]
    ProcessStartFailed(String),

    #[error("Failed to signal pid {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("IPC connection failed: {0}")]
    IpcConnectionFailed(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for sitevisor
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used at the boundaries that decide whether an error
/// is surfaced to the caller or contained and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ExecutableNotFound,
    AlreadyRunning,
    SpawnFailure,
    KillFailure,
    Persistence,
    NotFound,
    Invalid,
    Config,
    Ipc,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ExecutableNotFound { .. } => ErrorKind::ExecutableNotFound,
            Error::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Error::ProcessStartFailed(_) => ErrorKind::SpawnFailure,
            Error::KillFailed { .. } => ErrorKind::KillFailure,
            Error::DbError(_) => ErrorKind::Persistence,
            Error::SiteNotFound(_) | Error::CommandNotFound(_) | Error::FileNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::SiteAlreadyExists(_)
            | Error::CommandAlreadyExists(_)
            | Error::CommandInactive(_)
            | Error::InvalidSelector(_)
            | Error::InvalidName(_) => ErrorKind::Invalid,
            Error::ConfigError(_) | Error::TomlError(_) => ErrorKind::Config,
            Error::DaemonNotRunning
            | Error::IpcError(_)
            | Error::IpcConnectionFailed(_)
            | Error::JsonError(_) => ErrorKind::Ipc,
            Error::IoError(_) => ErrorKind::Io,
        }
    }

    /// Whether the operator can act on this error (bad input, missing
    /// program, already running). Everything else is an internal failure.
    pub fn is_caller_actionable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ExecutableNotFound
                | ErrorKind::AlreadyRunning
                | ErrorKind::SpawnFailure
                | ErrorKind::NotFound
                | ErrorKind::Invalid
        )
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn ipc<S: Into<String>>(msg: S) -> Self {
        Error::IpcError(msg.into())
    }

    pub fn db<S: Into<String>>(msg: S) -> Self {
        Error::DbError(msg.into())
    }

    pub fn process_start<S: Into<String>>(msg: S) -> Self {
        Error::ProcessStartFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CommandNotFound("demo/worker".to_string());
        assert_eq!(err.to_string(), "Command not found: demo/worker");
    }

    #[test]
    fn test_executable_not_found_display() {
        let err = Error::ExecutableNotFound {
            program: "docker".to_string(),
            command_line: "cd /srv && docker ps".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Executable not found: docker (command: cd /srv && docker ps)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_caller_actionable() {
        assert!(Error::AlreadyRunning("x".into()).is_caller_actionable());
        assert!(Error::process_start("fork failed").is_caller_actionable());
        assert!(!Error::db("locked").is_caller_actionable());
        assert!(!Error::KillFailed {
            pid: 1,
            reason: "EPERM".into()
        }
        .is_caller_actionable());
    }
}
