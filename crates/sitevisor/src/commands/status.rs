//! Status command implementation

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::print_status_table;

pub async fn execute() -> Result<()> {
    let client = super::get_client();

    match client.send(&Request::Status).await? {
        Response::Status { commands } => {
            print_status_table(&commands);
            Ok(())
        }
        other => super::unexpected(other),
    }
}
