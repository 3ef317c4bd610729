//! Constants and default values for sitevisor

use std::path::PathBuf;

/// Default home directory name
pub const SITEVISOR_DIR: &str = ".sitevisor";

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "SITEVISOR_HOME";

/// Default socket file name
pub const SOCKET_FILE: &str = "daemon.sock";

/// Default database file name
pub const DB_FILE: &str = "sitevisor.db";

/// Default daemon config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Default reconciliation poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default grace period between SIGTERM and SIGKILL in milliseconds
pub const DEFAULT_KILL_GRACE_MS: u64 = 3000;

/// Default max automatic restarts (0 = unlimited)
pub const DEFAULT_MAX_RESTARTS: u32 = 15;

/// Default base restart delay in milliseconds
pub const DEFAULT_RESTART_DELAY_MS: u64 = 500;

/// Upper bound for the exponential restart delay in milliseconds
pub const DEFAULT_MAX_RESTART_DELAY_MS: u64 = 30_000;

/// Uptime after which a crash starts a fresh restart streak
pub const DEFAULT_RESTART_RESET_SECS: u64 = 300;

/// Interpreter used for the fallback invocation
pub const DEFAULT_FALLBACK_INTERPRETER: &str = "python3";

/// Management entry point passed to the fallback interpreter
pub const DEFAULT_FALLBACK_ENTRY_POINT: &str = "manage.py";

/// Keywords that mark a command line as container tooling
pub const DEFAULT_CONTAINER_KEYWORDS: &[&str] = &["docker", "podman", "compose"];

/// Leading tokens ignored when checking which executable a line runs
pub const PRIVILEGE_WRAPPERS: &[&str] = &["sudo", "doas"];

/// Default number of log lines returned by a tail query
pub const DEFAULT_LOG_LINES: usize = 100;

/// Hard cap on log lines returned by a tail query
pub const MAX_LOG_LINES: usize = 1000;

/// Byte budget for a tail query's formatted output
pub const LOG_TAIL_BYTES: usize = 20_000;

/// Get the sitevisor home directory
pub fn sitevisor_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(SITEVISOR_DIR))
        .unwrap_or_else(|| PathBuf::from(SITEVISOR_DIR))
}

/// Get the socket path
pub fn socket_path() -> PathBuf {
    sitevisor_home().join(SOCKET_FILE)
}

/// Get the database path
pub fn db_path() -> PathBuf {
    sitevisor_home().join(DB_FILE)
}

/// Get the daemon config path
pub fn config_path() -> PathBuf {
    sitevisor_home().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path() {
        let path = socket_path();
        assert!(path.to_string_lossy().ends_with("daemon.sock"));
    }

    #[test]
    fn test_db_path() {
        let path = db_path();
        assert!(path.to_string_lossy().ends_with("sitevisor.db"));
    }
}
