//! IPC Client - Unix socket client for the CLI

use sitevisor_core::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::protocol::{Request, Response};

/// Daemon binary started on demand
const DAEMON_BIN: &str = "sitevisord";

/// How long to wait for a freshly started daemon to accept connections
const STARTUP_ATTEMPTS: u32 = 50;
const STARTUP_STEP: Duration = Duration::from_millis(100);

pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists()
    }

    /// Connect to daemon (without auto-start)
    pub async fn connect(&self) -> Result<UnixStream> {
        if !self.socket_path.exists() {
            return Err(Error::DaemonNotRunning);
        }

        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                    Error::DaemonNotRunning
                }
                _ => Error::IpcConnectionFailed(e.to_string()),
            })
    }

    /// Connect to daemon, starting it if necessary
    pub async fn connect_or_start(&self) -> Result<UnixStream> {
        match self.connect().await {
            Ok(stream) => Ok(stream),
            Err(Error::DaemonNotRunning) => {
                info!("Daemon not running, starting...");
                self.start_daemon()?;

                for attempt in 1..=STARTUP_ATTEMPTS {
                    tokio::time::sleep(STARTUP_STEP).await;
                    if let Ok(stream) = self.connect().await {
                        debug!("Connected to daemon after {} attempts", attempt);
                        return Ok(stream);
                    }
                }

                Err(Error::ipc("Daemon failed to start within timeout"))
            }
            Err(e) => Err(e),
        }
    }

    /// Spawn the daemon detached, preferring the binary next to the CLI
    fn start_daemon(&self) -> Result<()> {
        let exe = std::env::current_exe()?;
        let sibling = exe.parent().map(|dir| dir.join(DAEMON_BIN));

        let daemon_exe = match sibling {
            Some(path) if path.exists() => path,
            Some(path) => {
                warn!("{} not found at {}, trying PATH", DAEMON_BIN, path.display());
                PathBuf::from(DAEMON_BIN)
            }
            None => PathBuf::from(DAEMON_BIN),
        };

        info!("Starting daemon: {}", daemon_exe.display());

        std::process::Command::new(&daemon_exe)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| Error::ipc(format!("Failed to start daemon: {}", e)))?;

        Ok(())
    }

    /// Send a request, starting the daemon first if needed
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let stream = self.connect_or_start().await?;
        Self::exchange(stream, request).await
    }

    /// Send a request to an already running daemon
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let stream = self.connect().await?;
        Self::exchange(stream, request).await
    }

    async fn exchange(mut stream: UnixStream, request: &Request) -> Result<Response> {
        let mut json = serde_json::to_string(request)?;
        json.push('\n');

        stream
            .write_all(json.as_bytes())
            .await
            .map_err(|e| Error::ipc(format!("Write error: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::ipc(format!("Flush error: {}", e)))?;

        debug!("Sent request: {:?}", request);

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::ipc(format!("Read error: {}", e)))?;
        if n == 0 {
            return Err(Error::ipc("Daemon closed the connection without replying"));
        }

        let response: Response = serde_json::from_str(line.trim())
            .map_err(|e| Error::ipc(format!("Invalid response: {}", e)))?;

        debug!("Received response: {:?}", response);
        Ok(response)
    }

    /// Ping the daemon without starting it
    pub async fn ping(&self) -> Result<bool> {
        match self.request(&Request::Ping).await {
            Ok(Response::Pong) => Ok(true),
            Ok(_) => Ok(false),
            Err(Error::DaemonNotRunning) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
