//! Command implementations

pub mod command;
pub mod flush;
pub mod kill;
pub mod logs;
pub mod notify;
pub mod ping;
pub mod preview;
pub mod restart;
pub mod runs;
pub mod site;
pub mod start;
pub mod status;
pub mod stop;

use anyhow::{bail, Result};
use sitevisor_core::{constants, CommandRef};
use sitevisor_ipc::{IpcClient, Response};

use crate::output::print_error;

/// Get IPC client
pub fn get_client() -> IpcClient {
    IpcClient::new(constants::socket_path())
}

/// Parse a command reference before any daemon round trip
pub fn parse_target(target: &str) -> Result<CommandRef> {
    Ok(CommandRef::parse(target)?)
}

/// Report a response the caller did not expect
pub fn unexpected<T>(response: Response) -> Result<T> {
    match response {
        Response::Error { message, .. } => {
            print_error(&message);
            bail!(message)
        }
        _ => {
            print_error("Unexpected response from daemon");
            bail!("Unexpected response")
        }
    }
}
