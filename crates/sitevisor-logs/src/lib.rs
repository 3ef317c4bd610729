//! sitevisor Logs - per-command log sink, output capture and tail queries

mod reader;
mod sink;
mod streamer;

pub use reader::{format_entry, LogReader};
pub use sink::CommandLog;
pub use streamer::OutputStreamer;
