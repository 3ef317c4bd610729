//! Flush command implementation - deletes a command's log entries

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::{print_info, print_success};

pub async fn execute(target: &str) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();

    let response = client.send(&Request::Flush { target: target.clone() }).await?;

    match response {
        Response::Flushed { count } => {
            if count == 0 {
                print_info(&format!("No log entries for {}", target));
            } else {
                print_success(&format!("Flushed {} log entries for {}", count, target));
            }
            Ok(())
        }
        other => super::unexpected(other),
    }
}
