//! Restart command implementation

use anyhow::Result;
use sitevisor_ipc::{Request, Response};

use crate::output::{is_json_mode, print_json, print_success, print_warning};

pub async fn execute(target: &str) -> Result<()> {
    let target = super::parse_target(target)?;
    let client = super::get_client();

    let response = client.send(&Request::Restart { target: target.clone() }).await?;

    match response {
        Response::Restarted { run, fallback } => {
            if is_json_mode() {
                print_json(&run);
                return Ok(());
            }
            print_success(&format!(
                "Restarted {} (pid {})",
                target,
                run.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
            ));
            if fallback {
                print_warning("Primary executable was missing; the fallback line is running");
            }
            Ok(())
        }
        other => super::unexpected(other),
    }
}
