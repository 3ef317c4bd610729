//! Main daemon orchestration

use sitevisor_core::{constants, DaemonConfig, Result};
use sitevisor_db::Database;
use sitevisor_ipc::{IpcConnection, IpcServer};
use sitevisor_notify::{NotificationManager, Notifier};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handlers::RequestHandler;
use crate::supervisor::Supervisor;

pub struct Daemon {
    server: IpcServer,
    db: Database,
    supervisor: Supervisor,
    handler: Arc<RequestHandler>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub async fn new() -> Result<Self> {
        let config = DaemonConfig::load()?;
        info!(
            "Config: poll every {}s, kill grace {}ms, max restarts {}",
            config.poll_interval_secs, config.kill_grace_ms, config.restart.max_restarts
        );

        let db_path = constants::db_path();
        let db = Database::new(&db_path).await?;
        info!("Database initialized at {}", db_path.display());

        let notifier: Arc<dyn Notifier> = match NotificationManager::from_config_file() {
            Ok(manager) => {
                if manager.is_configured() {
                    info!("Crash notifications enabled");
                }
                Arc::new(manager)
            }
            Err(e) => {
                warn!("Notifications disabled, bad notify config: {}", e);
                Arc::new(NotificationManager::disabled())
            }
        };

        let supervisor = Supervisor::open(db.clone(), config, notifier).await?;

        let shutdown = CancellationToken::new();
        let handler = Arc::new(RequestHandler::new(supervisor.clone(), shutdown.clone()));

        let server = IpcServer::bind(&constants::socket_path()).await?;

        Ok(Self {
            server,
            db,
            supervisor,
            handler,
            shutdown,
        })
    }

    /// Serve connections until a kill request arrives
    pub async fn run(&self) -> Result<()> {
        info!("Daemon running, waiting for connections...");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Kill request received, shutting down...");
                    return Ok(());
                }
                accepted = self.server.accept() => match accepted {
                    Ok(conn) => {
                        tokio::spawn(serve_connection(conn, Arc::clone(&self.handler)));
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }

    /// Stop supervision loops and close the store; children keep running
    pub async fn shutdown(self) {
        self.supervisor.close().await;
        self.db.close().await;
    }
}

async fn serve_connection(mut conn: IpcConnection, handler: Arc<RequestHandler>) {
    loop {
        match conn.read_request().await {
            Ok(Some(request)) => {
                let response = handler.handle(request).await;
                if let Err(e) = conn.send_response(&response).await {
                    error!("Failed to send response: {}", e);
                    break;
                }
            }
            Ok(None) => {
                debug!("Connection closed");
                break;
            }
            Err(e) => {
                error!("Error reading request: {}", e);
                break;
            }
        }
    }
}
