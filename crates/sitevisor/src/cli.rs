//! CLI argument definitions

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sitevisor")]
#[command(version, about = "Supervise the long-running commands of your sites")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage sites
    Site(SiteArgs),

    /// Manage the commands of a site
    Command(CommandArgs),

    /// Start a command
    Start {
        /// Command id or site/command
        target: String,
    },

    /// Stop a command (no automatic restart follows)
    Stop {
        /// Command id or site/command
        target: String,
    },

    /// Stop then start a command
    Restart {
        /// Command id or site/command
        target: String,
    },

    /// Print the shell line a command would run
    Preview {
        /// Command id or site/command
        target: String,
    },

    /// Show the log of a command
    Logs(LogsArgs),

    /// Show the run history of a command
    Runs {
        /// Command id or site/command
        target: String,

        /// Number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Delete the log entries of a command
    Flush {
        /// Command id or site/command
        target: String,
    },

    /// Show the state of every command
    #[command(alias = "ls")]
    Status,

    /// Check if the daemon is alive
    Ping,

    /// Stop the daemon (supervised commands keep running)
    Kill,

    /// Configure notifications
    Notify(NotifyArgs),
}

#[derive(Args)]
pub struct SiteArgs {
    #[command(subcommand)]
    pub command: SiteCommand,
}

#[derive(Subcommand)]
pub enum SiteCommand {
    /// Register a site
    Add {
        /// Site name (letters, digits, '-', '_', '.')
        name: String,

        /// Working directory commands run from
        #[arg(long)]
        dir: Option<String>,

        /// Prefix prepended to every command of the site
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Change a site's directory or prefix
    Edit {
        name: String,

        #[arg(long)]
        dir: Option<String>,

        #[arg(long, conflicts_with = "no_prefix")]
        prefix: Option<String>,

        /// Remove the prefix
        #[arg(long)]
        no_prefix: bool,
    },

    /// List sites
    List,

    /// Remove a site, stopping its commands
    #[command(alias = "remove")]
    Rm { name: String },
}

#[derive(Args)]
pub struct CommandArgs {
    #[command(subcommand)]
    pub command: CommandSubcommand,
}

#[derive(Subcommand)]
pub enum CommandSubcommand {
    /// Add a command to a site
    Add {
        site: String,

        name: String,

        /// Command template; {KEY} placeholders come from --env
        template: String,

        /// Environment variable (KEY=VALUE, repeatable)
        #[arg(long = "env", value_parser = parse_env)]
        envs: Vec<(String, String)>,

        /// Register the command without allowing it to start
        #[arg(long)]
        inactive: bool,
    },

    /// Change a command's name, template or active flag
    Edit {
        /// Command id or site/command
        target: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        template: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Replace the whole env set of a command
    Env {
        /// Command id or site/command
        target: String,

        /// KEY=VALUE pairs; none clears the set
        #[arg(value_parser = parse_env)]
        envs: Vec<(String, String)>,
    },

    /// List commands, optionally for one site
    List { site: Option<String> },

    /// Remove a command, stopping it first
    #[command(alias = "remove")]
    Rm {
        /// Command id or site/command
        target: String,
    },
}

#[derive(Args)]
pub struct LogsArgs {
    /// Command id or site/command
    pub target: String,

    /// Number of lines to show
    #[arg(long)]
    pub lines: Option<usize>,

    /// Filter log lines by regex pattern
    #[arg(long)]
    pub grep: Option<String>,
}

#[derive(Args)]
pub struct NotifyArgs {
    #[command(subcommand)]
    pub command: NotifyCommand,
}

#[derive(Subcommand)]
pub enum NotifyCommand {
    /// Configure webhook notifications
    Webhook {
        /// Endpoint receiving {"content": "<message>"}
        #[arg(long)]
        url: String,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Remove the webhook configuration
    Remove,

    /// Set which events to notify on
    Events {
        /// Events to notify (comma-separated: crash,gave_up,started,stopped)
        #[arg(long)]
        set: String,
    },

    /// Show current notification configuration
    Status,

    /// Send a test message
    Test,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or("Expected KEY=VALUE format")?;
    let key = s[..pos].trim();
    if key.is_empty() {
        return Err("Empty key in KEY=VALUE".to_string());
    }
    Ok((key.to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_env() {
        assert_eq!(
            parse_env("PORT=8000").unwrap(),
            ("PORT".to_string(), "8000".to_string())
        );
        assert_eq!(
            parse_env("ARGS=--bind=0.0.0.0").unwrap(),
            ("ARGS".to_string(), "--bind=0.0.0.0".to_string())
        );
        assert_eq!(
            parse_env("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_env("novalue").is_err());
        assert!(parse_env("=x").is_err());
    }

    #[test]
    fn test_command_add_collects_envs() {
        let cli = Cli::try_parse_from([
            "sitevisor",
            "command",
            "add",
            "demo",
            "web",
            "runserver {PORT}",
            "--env",
            "PORT=8000",
            "--env",
            "DEBUG=1",
            "--inactive",
        ])
        .unwrap();

        match cli.command {
            Commands::Command(CommandArgs {
                command:
                    CommandSubcommand::Add {
                        site,
                        envs,
                        inactive,
                        ..
                    },
            }) => {
                assert_eq!(site, "demo");
                assert_eq!(envs.len(), 2);
                assert!(inactive);
            }
            _ => panic!("Wrong command parsed"),
        }
    }

    #[test]
    fn test_site_edit_prefix_conflicts() {
        let result = Cli::try_parse_from([
            "sitevisor",
            "site",
            "edit",
            "demo",
            "--prefix",
            "sudo",
            "--no-prefix",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sitevisor", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
