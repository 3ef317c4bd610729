//! Terminal and JSON output

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use sitevisor_core::{CommandInfo, CommandState, Run, Site};
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

/// Pretty-print any serializable value
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

#[derive(Tabled)]
pub struct StatusRow {
    #[tabled(rename = "id")]
    pub id: u32,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "pid")]
    pub pid: String,
    #[tabled(rename = "↺")]
    pub restarts: String,
    #[tabled(rename = "state")]
    pub state: String,
    #[tabled(rename = "uptime")]
    pub uptime: String,
    #[tabled(rename = "template")]
    pub template: String,
}

/// JSON-friendly status representation
#[derive(Serialize)]
pub struct StatusJson {
    pub id: u32,
    pub site: String,
    pub command: String,
    pub state: CommandState,
    pub active: bool,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub uptime_secs: u64,
    pub template: String,
}

/// The latest run only describes the present while it is live
fn live_run(info: &CommandInfo) -> Option<&Run> {
    info.latest_run.as_ref().filter(|run| run.is_live())
}

impl From<&CommandInfo> for StatusJson {
    fn from(info: &CommandInfo) -> Self {
        let run = live_run(info);
        StatusJson {
            id: info.command.id,
            site: info.site.name.clone(),
            command: info.command.name.clone(),
            state: info.state,
            active: info.command.active,
            pid: run.and_then(|r| r.pid),
            restarts: info.latest_run.as_ref().map(|r| r.restart_count).unwrap_or(0),
            uptime_secs: run.map(|r| r.uptime_secs()).unwrap_or(0),
            template: info.command.template.clone(),
        }
    }
}

fn colored_state(info: &CommandInfo) -> String {
    if !info.command.active {
        return "inactive".dimmed().to_string();
    }
    match info.state {
        CommandState::Running => "running".green().to_string(),
        CommandState::Idle => "idle".normal().to_string(),
        CommandState::Starting => "starting".yellow().to_string(),
        CommandState::Stopping => "stopping".yellow().to_string(),
        CommandState::Restarting => "restarting".red().bold().to_string(),
    }
}

impl From<&CommandInfo> for StatusRow {
    fn from(info: &CommandInfo) -> Self {
        let run = live_run(info);
        StatusRow {
            id: info.command.id,
            name: info.qualified_name(),
            pid: run
                .and_then(|r| r.pid)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            restarts: info
                .latest_run
                .as_ref()
                .map(|r| r.restart_count.to_string())
                .unwrap_or_else(|| "0".to_string()),
            state: colored_state(info),
            uptime: run
                .map(|r| format_duration(r.uptime_secs()))
                .unwrap_or_else(|| "-".to_string()),
            template: truncate(&info.command.template, 40),
        }
    }
}

pub fn print_status_table(commands: &[CommandInfo]) {
    if is_json_mode() {
        let json: Vec<StatusJson> = commands.iter().map(StatusJson::from).collect();
        print_json(&json);
        return;
    }

    if commands.is_empty() {
        println!("No commands registered");
        return;
    }

    let rows: Vec<StatusRow> = commands.iter().map(StatusRow::from).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

#[derive(Tabled)]
pub struct SiteRow {
    #[tabled(rename = "id")]
    pub id: u32,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "directory")]
    pub directory: String,
    #[tabled(rename = "prefix")]
    pub prefix: String,
}

impl From<&Site> for SiteRow {
    fn from(site: &Site) -> Self {
        SiteRow {
            id: site.id,
            name: site.name.clone(),
            directory: site.directory.clone().unwrap_or_else(|| "-".to_string()),
            prefix: site.base_command.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn print_sites_table(sites: &[Site]) {
    if is_json_mode() {
        print_json(sites);
        return;
    }

    if sites.is_empty() {
        println!("No sites registered");
        return;
    }

    let rows: Vec<SiteRow> = sites.iter().map(SiteRow::from).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

#[derive(Tabled)]
pub struct RunRow {
    #[tabled(rename = "run")]
    pub id: u32,
    #[tabled(rename = "pid")]
    pub pid: String,
    #[tabled(rename = "started")]
    pub started: String,
    #[tabled(rename = "stopped")]
    pub stopped: String,
    #[tabled(rename = "exit")]
    pub exit: String,
    #[tabled(rename = "↺")]
    pub restarts: u32,
    #[tabled(rename = "by")]
    pub by: String,
}

impl From<&Run> for RunRow {
    fn from(run: &Run) -> Self {
        let by = if run.is_live() {
            "live".green().to_string()
        } else if run.manually_stopped {
            "operator".to_string()
        } else {
            "crash/exit".yellow().to_string()
        };

        RunRow {
            id: run.id,
            pid: run
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            started: format_timestamp(&run.started_at),
            stopped: run
                .stopped_at
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
            exit: run
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            restarts: run.restart_count,
            by,
        }
    }
}

pub fn print_runs_table(runs: &[Run]) {
    if is_json_mode() {
        print_json(runs);
        return;
    }

    if runs.is_empty() {
        println!("No runs recorded");
        return;
    }

    let rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();

    println!("{}", table);
}

/// Print a single site, e.g. after `site add`
pub fn print_site(site: &Site, verb: &str) {
    if is_json_mode() {
        print_json(site);
        return;
    }
    print_success(&format!("Site '{}' {} (id {})", site.name, verb, site.id));
}

/// Print a single command, e.g. after `command add`
pub fn print_command(site: &Site, command: &sitevisor_core::Command, verb: &str) {
    if is_json_mode() {
        print_json(command);
        return;
    }
    print_success(&format!(
        "Command '{}/{}' {} (id {})",
        site.name, command.name, verb, command.id
    ));
    if !command.envs.is_empty() {
        let envs: Vec<String> = command
            .envs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        print_info(&format!("env: {}", envs.join(" ")));
    }
    if !command.active {
        print_info("inactive: it will not start until activated");
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print logs in JSON format if enabled
pub fn print_logs(lines: &[String]) {
    if is_json_mode() {
        print_json(lines);
        return;
    }

    if lines.is_empty() {
        print_info("No log entries");
        return;
    }

    for line in lines {
        println!("{}", line);
    }
}
