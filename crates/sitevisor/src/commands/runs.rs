//! Run history of a command

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::print_runs_table;

pub async fn execute(target: &str, limit: usize) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();

    match client.send(&Request::Runs { target, limit }).await? {
        Response::Runs { runs } => {
            print_runs_table(&runs);
            Ok(())
        }
        other => super::unexpected(other),
    }
}
