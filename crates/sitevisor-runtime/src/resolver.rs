//! Executable resolution
//!
//! Finds the program a built line will actually run and checks that it
//! exists. When a container runtime is missing, an interpreter-based
//! fallback line may be used instead.

use sitevisor_core::{Command, Error, FallbackConfig, Result, Site, PRIVILEGE_WRAPPERS};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::builder::{build_command, build_fallback_command};

/// sudo options that consume the following token
const SUDO_VALUE_FLAGS: &[&str] = &["-u", "-g", "-C", "-D", "-h", "-p", "-r", "-t", "-U"];

/// Names the shell resolves without a PATH lookup
const SHELL_BUILTINS: &[&str] = &[
    ":", ".", "[", "alias", "bg", "break", "cd", "command", "continue", "echo", "eval",
    "exec", "exit", "export", "false", "fg", "printf", "pwd", "read", "return", "set",
    "shift", "source", "test", "trap", "true", "type", "ulimit", "umask", "unset", "wait",
];

/// Outcome of resolving a command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The primary program exists
    Primary(String),
    /// The primary program is missing and the fallback line will run instead
    Fallback { line: String, missing: String },
}

impl Resolution {
    pub fn line(&self) -> &str {
        match self {
            Resolution::Primary(line) => line,
            Resolution::Fallback { line, .. } => line,
        }
    }

    pub fn missing(&self) -> Option<&str> {
        match self {
            Resolution::Primary(_) => None,
            Resolution::Fallback { missing, .. } => Some(missing),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback { .. })
    }
}

/// The program a line runs, plus the directory of the last `cd` before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedProgram {
    pub program: String,
    pub cwd: Option<PathBuf>,
}

/// Split into shell words, or on whitespace when quoting is malformed
pub fn tokenize(line: &str) -> Vec<String> {
    shell_words::split(line)
        .unwrap_or_else(|_| line.split_whitespace().map(str::to_string).collect())
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Skip leading assignments and privilege wrappers (with their flags)
fn strip_prelude(clause: &[String]) -> &[String] {
    let mut rest = clause;
    loop {
        match rest.first() {
            Some(tok) if is_assignment(tok) => rest = &rest[1..],
            Some(tok) if PRIVILEGE_WRAPPERS.contains(&tok.as_str()) => {
                rest = &rest[1..];
                while let Some(flag) = rest.first() {
                    if flag == "--" {
                        rest = &rest[1..];
                        break;
                    }
                    if !flag.starts_with('-') {
                        break;
                    }
                    let takes_value = SUDO_VALUE_FLAGS.contains(&flag.as_str());
                    rest = &rest[1..];
                    if takes_value && !rest.is_empty() {
                        rest = &rest[1..];
                    }
                }
            }
            _ => return rest,
        }
    }
}

/// Find the program that a built line runs: the first token of the first
/// clause that is not a `cd`, ignoring assignments and `sudo`/`doas`
pub fn checked_program(line: &str) -> Option<CheckedProgram> {
    let tokens = tokenize(line);
    let mut cwd: Option<PathBuf> = None;

    for clause in tokens.split(|t| t == "&&") {
        let clause = strip_prelude(clause);
        let Some(first) = clause.first() else {
            continue;
        };
        if first == "cd" {
            if let Some(dir) = clause.get(1) {
                let dir = PathBuf::from(dir);
                cwd = Some(match cwd {
                    Some(prev) if dir.is_relative() => prev.join(dir),
                    _ => dir,
                });
            }
            continue;
        }
        return Some(CheckedProgram {
            program: first.clone(),
            cwd,
        });
    }

    None
}

/// Whether a program can be executed, looked up on PATH or by path
pub fn program_exists(program: &str, cwd: Option<&Path>) -> bool {
    if SHELL_BUILTINS.contains(&program) {
        return true;
    }
    if program.contains('/') {
        let path = Path::new(program);
        return match cwd {
            Some(dir) if path.is_relative() => dir.join(path).exists(),
            _ => path.exists(),
        };
    }
    which::which(program).is_ok()
}

/// Resolves built command lines, falling back when configured
#[derive(Debug, Clone)]
pub struct Resolver {
    fallback: FallbackConfig,
}

impl Resolver {
    pub fn new(fallback: FallbackConfig) -> Self {
        Self { fallback }
    }

    /// Build and resolve the line for `command`.
    ///
    /// Does not log; the caller classifies and records the outcome.
    pub fn resolve(
        &self,
        site: &Site,
        command: &Command,
        envs: &BTreeMap<String, String>,
    ) -> Result<Resolution> {
        let line = build_command(site, command, envs);

        let checked = match checked_program(&line) {
            Some(checked) => checked,
            None => return Ok(Resolution::Primary(line)),
        };
        if program_exists(&checked.program, checked.cwd.as_deref()) {
            return Ok(Resolution::Primary(line));
        }

        if self.fallback.enabled
            && (self.fallback.mentions_container(&checked.program)
                || self.fallback.mentions_container(&line))
        {
            let fallback_line = build_fallback_command(site, command, envs, &self.fallback);
            let usable = checked_program(&fallback_line)
                .map(|fb| program_exists(&fb.program, fb.cwd.as_deref()))
                .unwrap_or(false);
            if usable {
                return Ok(Resolution::Fallback {
                    line: fallback_line,
                    missing: checked.program,
                });
            }
        }

        Err(Error::ExecutableNotFound {
            program: checked.program,
            command_line: line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(line: &str) -> Option<String> {
        checked_program(line).map(|c| c.program)
    }

    #[test]
    fn test_checked_program_skips_cd_and_wrappers() {
        assert_eq!(program("cd /srv/demo && echo hi").as_deref(), Some("echo"));
        assert_eq!(
            program("cd '/srv/my site' && sudo -u www docker compose up").as_deref(),
            Some("docker")
        );
        assert_eq!(program("doas -- podman ps").as_deref(), Some("podman"));
        assert_eq!(program("RUST_LOG=debug PORT=80 ./server").as_deref(), Some("./server"));
        assert_eq!(program("sudo DEBUG=1 node app.js").as_deref(), Some("node"));
        assert_eq!(program("cd /tmp"), None);
        assert_eq!(program(""), None);
    }

    #[test]
    fn test_checked_program_tracks_cwd() {
        let checked = checked_program("cd /srv && cd app && ./run.sh").unwrap();
        assert_eq!(checked.program, "./run.sh");
        assert_eq!(checked.cwd, Some(PathBuf::from("/srv/app")));
    }

    #[test]
    fn test_tokenize_malformed_quotes() {
        assert_eq!(tokenize("echo 'unterminated"), vec!["echo", "'unterminated"]);
    }

    #[test]
    fn test_program_exists() {
        assert!(program_exists("sh", None));
        assert!(program_exists("cd", None));
        assert!(!program_exists("sitevisor-no-such-program-xyz", None));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "#!/bin/sh\n").unwrap();
        assert!(program_exists("./run.sh", Some(dir.path())));
        assert!(!program_exists("./missing.sh", Some(dir.path())));
    }

    #[test]
    fn test_resolve_primary() {
        let resolver = Resolver::new(FallbackConfig::default());
        let site = Site::new("demo").with_directory("/tmp");
        let command = Command::new(1, "hello", "echo hi");
        let resolution = resolver.resolve(&site, &command, &BTreeMap::new()).unwrap();
        assert_eq!(resolution, Resolution::Primary("cd /tmp && echo hi".to_string()));
        assert!(resolution.missing().is_none());
    }

    #[test]
    fn test_resolve_missing_without_container_keyword() {
        let resolver = Resolver::new(FallbackConfig::default());
        let site = Site::new("demo");
        let command = Command::new(1, "x", "sitevisor-missing-tool --flag");
        let err = resolver.resolve(&site, &command, &BTreeMap::new()).unwrap_err();
        match err {
            Error::ExecutableNotFound {
                program,
                command_line,
            } => {
                assert_eq!(program, "sitevisor-missing-tool");
                assert_eq!(command_line, "sitevisor-missing-tool --flag");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_uses_fallback_for_missing_container_runtime() {
        let fallback = FallbackConfig {
            interpreter: "sh".to_string(),
            entry_point: "-c".to_string(),
            container_keywords: vec!["sitevisor-fake-docker".to_string()],
            ..FallbackConfig::default()
        };
        let resolver = Resolver::new(fallback);
        let site = Site::new("demo")
            .with_directory("/tmp")
            .with_base_command("sudo sitevisor-fake-docker compose exec web");
        let command = Command::new(1, "x", "true");

        let resolution = resolver.resolve(&site, &command, &BTreeMap::new()).unwrap();
        assert!(resolution.is_fallback());
        assert_eq!(resolution.missing(), Some("sitevisor-fake-docker"));
        assert_eq!(resolution.line(), "cd /tmp && sh -c true");
    }

    #[test]
    fn test_resolve_fallback_disabled() {
        let fallback = FallbackConfig {
            container_keywords: vec!["sitevisor-fake-docker".to_string()],
            ..FallbackConfig::disabled()
        };
        let resolver = Resolver::new(fallback);
        let site = Site::new("demo").with_base_command("sitevisor-fake-docker exec web");
        let command = Command::new(1, "x", "true");
        assert!(matches!(
            resolver.resolve(&site, &command, &BTreeMap::new()),
            Err(Error::ExecutableNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_fallback_interpreter_missing() {
        let fallback = FallbackConfig {
            interpreter: "sitevisor-no-python".to_string(),
            container_keywords: vec!["sitevisor-fake-docker".to_string()],
            ..FallbackConfig::default()
        };
        let resolver = Resolver::new(fallback);
        let site = Site::new("demo").with_base_command("sitevisor-fake-docker exec web");
        let command = Command::new(1, "x", "migrate");
        assert!(matches!(
            resolver.resolve(&site, &command, &BTreeMap::new()),
            Err(Error::ExecutableNotFound { .. })
        ));
    }
}
