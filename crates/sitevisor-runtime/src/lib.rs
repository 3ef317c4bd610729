//! sitevisor Runtime - building, resolving, starting and stopping commands

pub mod builder;
pub mod procs;
pub mod resolver;
pub mod signal;
pub mod spawn;

pub use builder::{build_command, build_fallback_command, render_template, TemplateError};
pub use procs::{detect_lister, NoopLister, PgrepLister, ProcessLister, SysinfoLister};
pub use resolver::{checked_program, Resolution, Resolver};
pub use signal::{kill_pid, process_exists};
pub use spawn::{Runner, RunningProcess, ShellRunner};
