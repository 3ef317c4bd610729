//! Command management commands

use anyhow::Result;
use sitevisor_core::CommandUpdate;
use sitevisor_ipc::{Request, Response};
use std::collections::BTreeMap;

use crate::cli::{CommandArgs, CommandSubcommand};
use crate::output::{print_command, print_status_table, print_success};

pub async fn execute(args: CommandArgs) -> Result<()> {
    match args.command {
        CommandSubcommand::Add {
            site,
            name,
            template,
            envs,
            inactive,
        } => add(site, name, template, envs, inactive).await,
        CommandSubcommand::Edit {
            target,
            name,
            template,
            active,
        } => edit(&target, name, template, active).await,
        CommandSubcommand::Env { target, envs } => env(&target, envs).await,
        CommandSubcommand::List { site } => list(site).await,
        CommandSubcommand::Rm { target } => remove(&target).await,
    }
}

async fn add(
    site: String,
    name: String,
    template: String,
    envs: Vec<(String, String)>,
    inactive: bool,
) -> Result<()> {
    let client = super::get_client();
    let request = Request::CommandAdd {
        site,
        name,
        template,
        envs: envs.into_iter().collect::<BTreeMap<_, _>>(),
        active: !inactive,
    };

    match client.send(&request).await? {
        Response::Command { site, command } => {
            print_command(&site, &command, "added");
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn edit(
    target: &str,
    name: Option<String>,
    template: Option<String>,
    active: Option<bool>,
) -> Result<()> {
    let target = super::parse_target(target)?;
    let update = CommandUpdate {
        name,
        template,
        active,
    };
    if update == CommandUpdate::default() {
        anyhow::bail!("Nothing to change: pass --name, --template or --active");
    }

    let client = super::get_client();
    match client.send(&Request::CommandEdit { target, update }).await? {
        Response::Command { site, command } => {
            print_command(&site, &command, "updated");
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn env(target: &str, envs: Vec<(String, String)>) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();
    let request = Request::CommandEnv {
        target,
        envs: envs.into_iter().collect(),
    };

    match client.send(&request).await? {
        Response::Command { site, command } => {
            print_command(&site, &command, "env replaced");
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn list(site: Option<String>) -> Result<()> {
    let client = super::get_client();
    match client.send(&Request::CommandList { site }).await? {
        Response::Commands { commands } => {
            print_status_table(&commands);
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn remove(target: &str) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();
    match client.send(&Request::CommandRemove { target }).await? {
        Response::Deleted { name } => {
            print_success(&format!("Command '{}' removed", name));
            Ok(())
        }
        other => super::unexpected(other),
    }
}
