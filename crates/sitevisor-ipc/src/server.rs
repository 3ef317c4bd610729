//! IPC Server - Unix socket server for the daemon

use sitevisor_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::protocol::{Request, Response};

/// Largest request line accepted from a client (10 MiB)
const MAX_MESSAGE_SIZE: u64 = 10 * 1024 * 1024;

/// IPC Server for daemon
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind to a Unix socket, replacing a stale socket file
    pub async fn bind(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| Error::ipc(format!("Failed to bind socket: {}", e)))?;

        // Owner-only access is the permission gate for every request
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::ipc(format!("Failed to set socket permissions: {}", e)))?;
        }

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
        })
    }

    /// Accept a new connection
    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| Error::ipc(format!("Accept failed: {}", e)))?;

        debug!("Accepted IPC connection");
        Ok(IpcConnection::new(stream))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                error!("Failed to remove socket file: {}", e);
            }
        }
    }
}

/// Single IPC connection
pub struct IpcConnection {
    stream: UnixStream,
}

impl IpcConnection {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Read one request; `None` when the peer closed the connection
    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        let limited = (&mut self.stream).take(MAX_MESSAGE_SIZE);
        let mut reader = BufReader::new(limited);
        let mut line = String::new();

        match reader.read_line(&mut line).await {
            Ok(0) => Ok(None),
            Ok(_) => {
                let request: Request = serde_json::from_str(line.trim())
                    .map_err(|e| Error::ipc(format!("Invalid request: {}", e)))?;
                debug!("Received request: {:?}", request);
                Ok(Some(request))
            }
            Err(e) => Err(Error::ipc(format!("Read error: {}", e))),
        }
    }

    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');

        self.stream
            .write_all(json.as_bytes())
            .await
            .map_err(|e| Error::ipc(format!("Write error: {}", e)))?;

        self.stream
            .flush()
            .await
            .map_err(|e| Error::ipc(format!("Flush error: {}", e)))?;

        debug!("Sent response: {:?}", response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IpcClient;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_server_bind_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let server = IpcServer::bind(&socket_path).await.unwrap();
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_request_response_over_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("rr.sock");
        let server = IpcServer::bind(&socket_path).await.unwrap();

        let handle = tokio::spawn(async move {
            let mut conn = server.accept().await.unwrap();
            let request = conn.read_request().await.unwrap();
            assert!(matches!(request, Some(Request::Ping)));
            conn.send_response(&Response::Pong).await.unwrap();
        });

        let client = IpcClient::new(socket_path);
        let response = client.request(&Request::Ping).await.unwrap();
        assert!(matches!(response, Response::Pong));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_request_is_ipc_error() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("bad.sock");
        let server = IpcServer::bind(&socket_path).await.unwrap();

        let mut raw = UnixStream::connect(&socket_path).await.unwrap();
        raw.write_all(b"{\"type\":\"explode\"}\n").await.unwrap();

        let mut conn = server.accept().await.unwrap();
        assert!(matches!(conn.read_request().await, Err(Error::IpcError(_))));
    }
}
