//! Stop command implementation

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::{print_info, print_success};

pub async fn execute(target: &str) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();

    let response = client.send(&Request::Stop { target: target.clone() }).await?;

    match response {
        Response::Stopped { count } => {
            if count > 0 {
                print_success(&format!("Stopped {} ({} process(es))", target, count));
            } else {
                print_info(&format!("{} was not running", target));
            }
            Ok(())
        }
        other => super::unexpected(other),
    }
}
