//! Logs command implementation

use anyhow::Result;
use regex::Regex;
use sitevisor_ipc::{Request, Response};

use crate::cli::LogsArgs;
use crate::output::print_logs;

pub async fn execute(args: LogsArgs) -> Result<()> {
    let target = super::parse_target(&args.target)?;

    // The daemon filters, but a bad pattern should fail before the round trip
    if let Some(pattern) = &args.grep {
        Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex pattern: {}", e))?;
    }

    let client = super::get_client();
    let response = client
        .send(&Request::Logs {
            target,
            lines: args.lines,
            grep: args.grep,
        })
        .await?;

    match response {
        Response::LogLines { lines } => {
            print_logs(&lines);
            Ok(())
        }
        other => super::unexpected(other),
    }
}
