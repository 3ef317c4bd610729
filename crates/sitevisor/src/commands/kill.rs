//! Kill command implementation

use anyhow::Result;
use sitevisor_core::Error;
use sitevisor_ipc::{Request, Response};

use crate::output::{print_info, print_success};

pub async fn execute() -> Result<()> {
    let client = super::get_client();

    match client.request(&Request::Kill).await {
        Ok(Response::Ok { message }) => {
            print_success(&message);
            print_info("Supervised commands keep running");
            Ok(())
        }
        Ok(other) => super::unexpected(other),
        Err(Error::DaemonNotRunning) => {
            print_success("Daemon is not running");
            Ok(())
        }
        // The daemon may drop the connection while shutting down
        Err(Error::IpcError(_)) => {
            print_success("Daemon killed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
