//! Runner trait and the shell runner

use async_trait::async_trait;
use sitevisor_core::{Error, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::info;

/// A running process with its handles
pub struct RunningProcess {
    pub pid: u32,
    pub child: Child,
}

impl RunningProcess {
    pub fn new(pid: u32, child: Child) -> Self {
        Self { pid, child }
    }
}

/// Starts a built command line as a child process
#[async_trait]
pub trait Runner: Send + Sync {
    /// Start `line` with piped stdout/stderr
    async fn start(&self, line: &str) -> Result<RunningProcess>;
}

/// Runs lines through `sh -c` as the leader of a new process group
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

#[async_trait]
impl Runner for ShellRunner {
    async fn start(&self, line: &str) -> Result<RunningProcess> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| Error::process_start(format!("Failed to start '{}': {}", line, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| Error::process_start("Process started but no PID available"))?;

        info!("Started '{}' with PID {}", line, pid);
        Ok(RunningProcess::new(pid, child))
    }
}
