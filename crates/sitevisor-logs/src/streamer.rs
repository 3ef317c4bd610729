//! Output streamer: child stdout/stderr into the command log

use sitevisor_core::LogLevel;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sink::CommandLog;

/// Spawns one line-reading task per output stream of a run
pub struct OutputStreamer {
    log: CommandLog,
    cancel: CancellationToken,
}

impl OutputStreamer {
    pub fn new(log: CommandLog, cancel: CancellationToken) -> Self {
        Self { log, cancel }
    }

    /// Capture stdout at INFO and stderr at ERROR
    pub fn spawn_capture(
        self,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> (Option<JoinHandle<()>>, Option<JoinHandle<()>>) {
        let stdout_handle = stdout.map(|out| {
            spawn_stream(out, LogLevel::Info, self.log.clone(), self.cancel.clone())
        });
        let stderr_handle = stderr.map(|err| {
            spawn_stream(err, LogLevel::Error, self.log.clone(), self.cancel.clone())
        });
        (stdout_handle, stderr_handle)
    }
}

/// Read `reader` line by line into `log` until EOF, error or cancellation
pub fn spawn_stream<R>(
    reader: R,
    level: LogLevel,
    log: CommandLog,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {
                    // Undecodable bytes are replaced, never fatal to the stream
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\n', '\r']);
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = log.append(level, line).await {
                        warn!("[{}] failed to store output line: {}", log.label(), e);
                    }
                }
                Err(e) => {
                    debug!("[{}] output stream closed: {}", log.label(), e);
                    break;
                }
            }
        }
    })
}
