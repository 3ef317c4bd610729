//! Preview command implementation

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::{is_json_mode, print_json};

pub async fn execute(target: &str) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();

    match client.send(&Request::Preview { target }).await? {
        Response::Preview { line } => {
            if is_json_mode() {
                print_json(&serde_json::json!({ "line": line }));
            } else {
                println!("{}", line);
            }
            Ok(())
        }
        other => super::unexpected(other),
    }
}
