//! Process signalling
//!
//! Termination goes to the process group first so that shells and their
//! children die together.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sitevisor_core::{Error, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Interval between liveness checks while waiting for a process to exit
pub const POLL_STEP: Duration = Duration::from_millis(100);

/// Whether a pid exists in the OS process table (EPERM counts as alive)
pub fn process_exists(pid: u32) -> bool {
    let Some(raw) = to_raw(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn to_raw(pid: u32) -> Option<i32> {
    i32::try_from(pid).ok().filter(|p| *p > 0)
}

/// Deliver `signal` to the group led by `pid`, or to `pid` alone if it
/// leads no group. A vanished target is not an error.
pub fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    let raw = to_raw(pid).ok_or_else(|| Error::KillFailed {
        pid,
        reason: "invalid pid".to_string(),
    })?;

    match kill(Pid::from_raw(-raw), signal) {
        Ok(()) => return Ok(()),
        Err(Errno::ESRCH) => {}
        Err(err) => debug!("group {:?} to {} failed: {}", signal, pid, err),
    }

    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(Error::KillFailed {
            pid,
            reason: err.to_string(),
        }),
    }
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL
pub async fn kill_pid(pid: u32, grace: Duration) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)?;

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return Ok(());
        }
        sleep(POLL_STEP).await;
    }

    if process_exists(pid) {
        debug!("pid {} survived SIGTERM, sending SIGKILL", pid);
        signal_group(pid, Signal::SIGKILL)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[test]
    fn test_process_exists() {
        assert!(process_exists(std::process::id()));
        assert!(!process_exists(0));
        assert!(!process_exists(u32::MAX));
    }

    #[tokio::test]
    async fn test_kill_pid_terminates_group() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 60 & wait")
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let waiter = tokio::spawn(async move { child.wait().await });
        kill_pid(pid, Duration::from_secs(2)).await.unwrap();

        let status = waiter.await.unwrap().unwrap();
        assert!(!status.success());
        assert!(!process_exists(pid));
    }

    #[tokio::test]
    async fn test_kill_pid_escalates_to_sigkill() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; while true; do sleep 1; done")
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let waiter = tokio::spawn(async move { child.wait().await });
        kill_pid(pid, Duration::from_millis(300)).await.unwrap();

        let status = waiter.await.unwrap().unwrap();
        assert!(status.code().is_none());
    }

    #[tokio::test]
    async fn test_kill_pid_on_vanished_process() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        assert!(kill_pid(pid, Duration::from_millis(100)).await.is_ok());
    }
}
