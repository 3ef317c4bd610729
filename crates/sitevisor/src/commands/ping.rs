//! Ping command implementation

use anyhow::{bail, Result};

use crate::output::{print_error, print_success};

pub async fn execute() -> Result<()> {
    let client = super::get_client();

    // Never auto-starts the daemon
    match client.ping().await {
        Ok(true) => {
            print_success("Daemon is alive");
            Ok(())
        }
        Ok(false) => {
            print_error("Daemon is not running");
            bail!("Daemon not running")
        }
        Err(e) => {
            print_error(&format!("Daemon did not answer: {}", e));
            bail!(e)
        }
    }
}
