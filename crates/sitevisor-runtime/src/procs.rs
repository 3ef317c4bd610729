//! Process table inspection
//!
//! Finds live processes whose full command line contains a pattern. Which
//! backend is used is decided once at startup by [`detect_lister`].

use async_trait::async_trait;
use sitevisor_core::{Error, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, warn};

/// Capability to search the OS process table by command line
#[async_trait]
pub trait ProcessLister: Send + Sync {
    /// Backend name, for diagnostics
    fn name(&self) -> &'static str;

    /// Pids whose command line contains any of `patterns`
    async fn find_matching(&self, patterns: &[String]) -> Result<Vec<u32>>;
}

/// In-process inspection through `sysinfo`
#[derive(Debug, Default)]
pub struct SysinfoLister;

#[async_trait]
impl ProcessLister for SysinfoLister {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    async fn find_matching(&self, patterns: &[String]) -> Result<Vec<u32>> {
        let patterns: Vec<String> = patterns.iter().filter(|p| !p.is_empty()).cloned().collect();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        tokio::task::spawn_blocking(move || {
            let mut system = System::new();
            system.refresh_processes();

            let pids: BTreeSet<u32> = system
                .processes()
                .iter()
                .filter_map(|(pid, process)| {
                    let cmdline = process.cmd().join(" ");
                    if cmdline.is_empty() {
                        return None;
                    }
                    patterns
                        .iter()
                        .any(|p| cmdline.contains(p.as_str()))
                        .then(|| pid.as_u32())
                })
                .collect();
            pids.into_iter().collect()
        })
        .await
        .map_err(|e| Error::IoError(std::io::Error::other(e)))
    }
}

/// External `pgrep -f` lookup, one invocation per pattern
#[derive(Debug, Default)]
pub struct PgrepLister;

#[async_trait]
impl ProcessLister for PgrepLister {
    fn name(&self) -> &'static str {
        "pgrep"
    }

    async fn find_matching(&self, patterns: &[String]) -> Result<Vec<u32>> {
        let mut pids = BTreeSet::new();

        for pattern in patterns.iter().filter(|p| !p.is_empty()) {
            let output = Command::new("pgrep")
                .arg("-f")
                .arg("--")
                .arg(regex::escape(pattern))
                .output()
                .await?;

            // Exit status 1 means no match
            if !output.status.success() && output.status.code() != Some(1) {
                debug!(
                    "pgrep failed for '{}': {}",
                    pattern,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                continue;
            }

            pids.extend(
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .filter_map(|l| l.trim().parse::<u32>().ok()),
            );
        }

        Ok(pids.into_iter().collect())
    }
}

/// Used when no inspection backend is available; never matches anything
#[derive(Debug, Default)]
pub struct NoopLister {
    warned: AtomicBool,
}

#[async_trait]
impl ProcessLister for NoopLister {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn find_matching(&self, _patterns: &[String]) -> Result<Vec<u32>> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("No process inspection backend available; stray processes will not be reclaimed");
        }
        Ok(Vec::new())
    }
}

/// Pick the best available backend
pub fn detect_lister() -> Arc<dyn ProcessLister> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Arc::new(SysinfoLister)
    } else if which::which("pgrep").is_ok() {
        Arc::new(PgrepLister)
    } else {
        Arc::new(NoopLister::default())
    }
}
