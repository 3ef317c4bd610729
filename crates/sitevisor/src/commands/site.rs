//! Site management commands

use anyhow::Result;
use sitevisor_core::SiteUpdate;
use sitevisor_ipc::{Request, Response};

use crate::cli::{SiteArgs, SiteCommand};
use crate::output::{print_site, print_sites_table, print_success};

pub async fn execute(args: SiteArgs) -> Result<()> {
    match args.command {
        SiteCommand::Add { name, dir, prefix } => add(name, dir, prefix).await,
        SiteCommand::Edit {
            name,
            dir,
            prefix,
            no_prefix,
        } => edit(name, dir, prefix, no_prefix).await,
        SiteCommand::List => list().await,
        SiteCommand::Rm { name } => remove(name).await,
    }
}

async fn add(name: String, directory: Option<String>, base_command: Option<String>) -> Result<()> {
    let client = super::get_client();
    let request = Request::SiteAdd {
        name,
        directory,
        base_command,
    };

    match client.send(&request).await? {
        Response::Site { site } => {
            print_site(&site, "added");
            Ok(())
        }
        other => super::unexpected(other),
    }
}

/// Build the partial update; `--no-prefix` clears, `--prefix` replaces
fn site_update(dir: Option<String>, prefix: Option<String>, no_prefix: bool) -> SiteUpdate {
    let base_command = if no_prefix {
        Some(None)
    } else {
        prefix.map(Some)
    };
    SiteUpdate {
        directory: dir,
        base_command,
    }
}

async fn edit(name: String, dir: Option<String>, prefix: Option<String>, no_prefix: bool) -> Result<()> {
    let update = site_update(dir, prefix, no_prefix);
    if update == SiteUpdate::default() {
        anyhow::bail!("Nothing to change: pass --dir, --prefix or --no-prefix");
    }

    let client = super::get_client();
    match client.send(&Request::SiteEdit { name, update }).await? {
        Response::Site { site } => {
            print_site(&site, "updated");
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn list() -> Result<()> {
    let client = super::get_client();
    match client.send(&Request::SiteList).await? {
        Response::Sites { sites } => {
            print_sites_table(&sites);
            Ok(())
        }
        other => super::unexpected(other),
    }
}

async fn remove(name: String) -> Result<()> {
    let client = super::get_client();
    match client.send(&Request::SiteRemove { name }).await? {
        Response::Deleted { name } => {
            print_success(&format!("Site '{}' removed", name));
            Ok(())
        }
        other => super::unexpected(other),
    }
}
