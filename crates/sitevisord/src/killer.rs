//! Stray process reclamation

use sitevisor_core::{Command, FallbackConfig, Site};
use sitevisor_db::RunsRepository;
use sitevisor_logs::CommandLog;
use sitevisor_runtime::builder::render_or_literal;
use sitevisor_runtime::{build_command, build_fallback_command, kill_pid, ProcessLister};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Substrings that identify leftover instances of `command`: the full line,
/// the rendered template, the raw template and the fallback line
pub fn match_patterns(site: &Site, command: &Command, fallback: &FallbackConfig) -> Vec<String> {
    let mut patterns = vec![
        build_command(site, command, &command.envs),
        render_or_literal(&command.template, &command.envs),
        command.template.clone(),
    ];
    if fallback.enabled {
        patterns.push(build_fallback_command(site, command, &command.envs, fallback));
    }

    let mut unique: Vec<String> = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let pattern = pattern.trim().to_string();
        if !pattern.is_empty() && !unique.contains(&pattern) {
            unique.push(pattern);
        }
    }
    unique
}

/// Kills processes by command line and closes the runs that owned them
#[derive(Clone)]
pub struct ProcessKiller {
    lister: Arc<dyn ProcessLister>,
    runs: RunsRepository,
    grace: Duration,
}

impl ProcessKiller {
    pub fn new(lister: Arc<dyn ProcessLister>, runs: RunsRepository, grace: Duration) -> Self {
        Self {
            lister,
            runs,
            grace,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.lister.name()
    }

    /// Terminate every process whose command line contains one of
    /// `patterns`, except this daemon. Returns how many were killed.
    pub async fn kill_matching(&self, patterns: &[String], log: &CommandLog) -> usize {
        let own_pid = std::process::id();

        let pids = match self.lister.find_matching(patterns).await {
            Ok(pids) => pids,
            Err(e) => {
                warn!("[{}] process scan via {} failed: {}", log.label(), self.backend(), e);
                return 0;
            }
        };

        let mut killed = 0;
        for pid in pids.into_iter().filter(|pid| *pid != own_pid) {
            log.info(format!("Killing stray process {}", pid)).await;

            if let Err(e) = kill_pid(pid, self.grace).await {
                log.warning(format!("Could not kill process {}: {}", pid, e)).await;
                continue;
            }
            killed += 1;

            match self.runs.close_by_pid(pid).await {
                Ok(0) => {}
                Ok(n) => debug!("Closed {} run(s) that still owned pid {}", n, pid),
                Err(e) => warn!("Failed to close runs for pid {}: {}", pid, e),
            }
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitevisor_core::LogLevel;
    use sitevisor_db::Database;
    use sitevisor_runtime::{process_exists, NoopLister, Runner, ShellRunner};

    /// Reports a fixed set of pids regardless of patterns
    struct FixedLister(Vec<u32>);

    #[async_trait]
    impl ProcessLister for FixedLister {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn find_matching(&self, _patterns: &[String]) -> sitevisor_core::Result<Vec<u32>> {
            Ok(self.0.clone())
        }
    }

    async fn setup() -> (Database, Site, Command, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let site = db
            .sites()
            .insert(&Site::new("demo").with_directory("/srv/demo"))
            .await
            .unwrap();
        let command = db
            .commands()
            .insert(&Command::new(site.id, "worker", "echo {msg}").with_env("msg", "hi"))
            .await
            .unwrap();
        (db, site, command, dir)
    }

    fn log_for(db: &Database, site: &Site, command: &Command) -> CommandLog {
        CommandLog::new(db.logs(), Some(site.id), Some(command.id), "demo/worker")
    }

    #[test]
    fn test_match_patterns() {
        let site = Site::new("demo").with_directory("/srv/demo");
        let command = Command::new(1, "worker", "echo {msg}").with_env("msg", "hi");

        let patterns = match_patterns(&site, &command, &FallbackConfig::default());
        assert_eq!(
            patterns,
            vec![
                "cd /srv/demo && echo hi".to_string(),
                "echo hi".to_string(),
                "echo {msg}".to_string(),
                "cd /srv/demo && python3 manage.py echo hi".to_string(),
            ]
        );

        let patterns = match_patterns(&site, &command, &FallbackConfig::disabled());
        assert_eq!(patterns.len(), 3);
    }

    #[test]
    fn test_match_patterns_dedupes() {
        let site = Site::new("bare");
        let command = Command::new(1, "w", "sleep 5");
        let patterns = match_patterns(&site, &command, &FallbackConfig::disabled());
        assert_eq!(patterns, vec!["sleep 5".to_string()]);
    }

    #[tokio::test]
    async fn test_kill_matching_empty_table() {
        let (db, site, command, _dir) = setup().await;
        let killer = ProcessKiller::new(
            Arc::new(NoopLister::default()),
            db.runs(),
            Duration::from_millis(200),
        );

        let patterns = match_patterns(&site, &command, &FallbackConfig::default());
        let killed = killer.kill_matching(&patterns, &log_for(&db, &site, &command)).await;
        assert_eq!(killed, 0);
    }

    #[tokio::test]
    async fn test_kill_matching_kills_and_closes_run() {
        let (db, site, command, _dir) = setup().await;

        let running = ShellRunner::default().start("sleep 30417").await.unwrap();
        let pid = running.pid;
        let mut child = running.child;
        let reaper = tokio::spawn(async move { child.wait().await });

        let run = db.runs().insert(command.id, Some(pid), 0).await.unwrap();

        let killer = ProcessKiller::new(
            Arc::new(FixedLister(vec![pid, std::process::id()])),
            db.runs(),
            Duration::from_secs(2),
        );
        let log = log_for(&db, &site, &command);
        let killed = killer.kill_matching(&["sleep 30417".to_string()], &log).await;

        assert_eq!(killed, 1);
        reaper.await.unwrap().unwrap();
        assert!(!process_exists(pid));

        let closed = db.runs().get(run.id).await.unwrap().unwrap();
        assert!(!closed.is_live());
        assert!(closed.manually_stopped);
        assert_eq!(
            db.logs().count(command.id, Some(LogLevel::Info)).await.unwrap(),
            1
        );
    }
}
