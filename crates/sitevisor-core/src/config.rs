//! Daemon configuration for sitevisor
//!
//! Loaded from `~/.sitevisor/config.toml`. Every field is optional and
//! falls back to the defaults in [`crate::constants`]. A handful of
//! environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Environment variable overriding `poll_interval_secs`
pub const POLL_INTERVAL_ENV: &str = "SITEVISOR_POLL_INTERVAL";

/// Automatic restart policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Maximum automatic restarts per crash streak (0 = unlimited)
    pub max_restarts: u32,
    /// Delay before the first restart, doubled on each subsequent one
    pub base_delay_ms: u64,
    /// Upper bound on the restart delay
    pub max_delay_ms: u64,
    /// A run that stayed up this long before crashing starts a new streak
    /// (0 = streaks only end on an operator start)
    pub reset_after_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: DEFAULT_MAX_RESTARTS,
            base_delay_ms: DEFAULT_RESTART_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_RESTART_DELAY_MS,
            reset_after_secs: DEFAULT_RESTART_RESET_SECS,
        }
    }
}

impl RestartPolicy {
    /// Policy with no backoff, used where restarts must be immediate
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Position of the next restart within the crash streak, given the
    /// restarts already in the streak and how long the crashed run lived
    pub fn next_in_streak(&self, streak: u32, uptime: Duration) -> u32 {
        if self.reset_after_secs > 0 && uptime >= Duration::from_secs(self.reset_after_secs) {
            1
        } else {
            streak.saturating_add(1)
        }
    }

    /// Whether the restart at `attempt` within a streak is still permitted
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_restarts == 0 || attempt <= self.max_restarts
    }

    /// Backoff before the restart at `attempt` within a streak (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 || attempt == 0 {
            return Duration::ZERO;
        }
        let shift = (attempt - 1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_delay_ms.max(self.base_delay_ms)))
    }
}

/// Alternate invocation used when a container runtime is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub interpreter: String,
    pub entry_point: String,
    pub container_keywords: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: DEFAULT_FALLBACK_INTERPRETER.to_string(),
            entry_point: DEFAULT_FALLBACK_ENTRY_POINT.to_string(),
            container_keywords: DEFAULT_CONTAINER_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FallbackConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether any configured container keyword appears in `text`
    pub fn mentions_container(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.container_keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| lower.contains(&k.to_lowercase()))
    }

    /// The prefix substituted for the site's base command
    pub fn prefix(&self) -> String {
        format!("{} {}", self.interpreter, self.entry_point)
            .trim()
            .to_string()
    }
}

/// Daemon configuration (config.toml)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub kill_grace_ms: u64,
    pub restart: RestartPolicy,
    pub fallback: FallbackConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            restart: RestartPolicy::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from the default location, then apply env overrides
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(POLL_INTERVAL_ENV) {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.poll_interval_secs = secs,
                Err(_) => {
                    // Ignored: a bad override keeps the file value
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be at least 1"));
        }
        if self.fallback.enabled && self.fallback.interpreter.trim().is_empty() {
            return Err(Error::config("fallback.interpreter must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.restart.max_restarts, 15);
        assert!(config.fallback.enabled);
        assert_eq!(config.fallback.prefix(), "python3 manage.py");
    }

    #[test]
    fn test_parse_partial() {
        let config = DaemonConfig::parse(
            r#"
poll_interval_secs = 2

[restart]
max_restarts = 0

[fallback]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.kill_grace_ms, DEFAULT_KILL_GRACE_MS);
        assert_eq!(config.restart.max_restarts, 0);
        assert_eq!(config.restart.base_delay_ms, DEFAULT_RESTART_DELAY_MS);
        assert_eq!(config.restart.reset_after_secs, DEFAULT_RESTART_RESET_SECS);
        assert!(!config.fallback.enabled);
        assert_eq!(config.fallback.interpreter, "python3");
    }

    #[test]
    fn test_parse_rejects_zero_poll() {
        assert!(DaemonConfig::parse("poll_interval_secs = 0").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "kill_grace_ms = 250").unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.kill_grace(), Duration::from_millis(250));

        let missing = DaemonConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_restart_backoff() {
        let policy = RestartPolicy {
            max_restarts: 5,
            base_delay_ms: 500,
            max_delay_ms: 3000,
            reset_after_secs: 0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(3000));
        assert_eq!(RestartPolicy::immediate().delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_restart_limit() {
        let policy = RestartPolicy {
            max_restarts: 2,
            ..RestartPolicy::default()
        };
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        let unlimited = RestartPolicy {
            max_restarts: 0,
            ..RestartPolicy::default()
        };
        assert!(unlimited.allows(10_000));
    }

    #[test]
    fn test_streak_resets_after_stable_uptime() {
        let policy = RestartPolicy {
            max_restarts: 3,
            reset_after_secs: 60,
            ..RestartPolicy::default()
        };
        assert_eq!(policy.next_in_streak(0, Duration::from_secs(1)), 1);
        assert_eq!(policy.next_in_streak(3, Duration::from_secs(59)), 4);
        assert!(!policy.allows(policy.next_in_streak(3, Duration::from_secs(59))));

        // A long-lived run after many crashes is restarted as a first attempt
        let next = policy.next_in_streak(40, Duration::from_secs(60));
        assert_eq!(next, 1);
        assert!(policy.allows(next));
        assert_eq!(policy.delay_for(next), Duration::from_millis(DEFAULT_RESTART_DELAY_MS));

        let never = RestartPolicy {
            reset_after_secs: 0,
            ..policy
        };
        assert_eq!(never.next_in_streak(3, Duration::from_secs(86_400)), 4);
    }

    #[test]
    fn test_mentions_container() {
        let fallback = FallbackConfig::default();
        assert!(fallback.mentions_container("docker compose up"));
        assert!(fallback.mentions_container("cd /srv && Podman run x"));
        assert!(!fallback.mentions_container("python3 manage.py runserver"));
    }
}
