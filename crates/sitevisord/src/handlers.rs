//! IPC request handlers

use regex::Regex;
use sitevisor_core::{
    validate_name, Command, CommandRef, CommandUpdate, Error, Result, Site, SiteUpdate,
};
use sitevisor_ipc::{Request, Response};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::supervisor::Supervisor;

/// Run history length when the client asks for 0
const DEFAULT_RUNS_LIMIT: usize = 20;

/// Turns requests into store and supervisor calls
pub struct RequestHandler {
    supervisor: Supervisor,
    shutdown: CancellationToken,
}

impl RequestHandler {
    pub fn new(supervisor: Supervisor, shutdown: CancellationToken) -> Self {
        Self {
            supervisor,
            shutdown,
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::Kill => {
                info!("Shutdown requested over IPC");
                self.shutdown.cancel();
                Ok(Response::ok("Daemon shutting down"))
            }
            Request::SiteAdd {
                name,
                directory,
                base_command,
            } => self.site_add(name, directory, base_command).await,
            Request::SiteEdit { name, update } => self.site_edit(&name, update).await,
            Request::SiteList => self
                .supervisor
                .db()
                .sites()
                .get_all()
                .await
                .map(|sites| Response::Sites { sites }),
            Request::SiteRemove { name } => self.site_remove(&name).await,
            Request::CommandAdd {
                site,
                name,
                template,
                envs,
                active,
            } => self.command_add(&site, name, template, envs, active).await,
            Request::CommandEdit { target, update } => self.command_edit(&target, update).await,
            Request::CommandEnv { target, envs } => self.command_env(&target, envs).await,
            Request::CommandList { site } => self.command_list(site.as_deref()).await,
            Request::CommandRemove { target } => self.command_remove(&target).await,
            Request::Start { target } => self.start(&target).await,
            Request::Stop { target } => self.stop(&target).await,
            Request::Restart { target } => self.restart(&target).await,
            Request::Preview { target } => self.preview(&target).await,
            Request::Logs {
                target,
                lines,
                grep,
            } => self.logs(&target, lines, grep.as_deref()).await,
            Request::Runs { target, limit } => self.runs(&target, limit).await,
            Request::Flush { target } => self.flush(&target).await,
            Request::Status => self
                .supervisor
                .status()
                .await
                .map(|commands| Response::Status { commands }),
        };

        result.unwrap_or_else(|e| {
            if e.is_caller_actionable() {
                warn!("Request failed: {}", e);
            } else {
                error!("Request failed: {}", e);
            }
            Response::from_error(&e)
        })
    }

    async fn resolve(&self, target: &CommandRef) -> Result<Command> {
        self.supervisor
            .db()
            .commands()
            .get_by_ref(target)
            .await?
            .ok_or_else(|| Error::CommandNotFound(target.to_string()))
    }

    async fn site_named(&self, name: &str) -> Result<Site> {
        self.supervisor
            .db()
            .sites()
            .get_by_name(name)
            .await?
            .ok_or_else(|| Error::SiteNotFound(name.to_string()))
    }

    async fn site_add(
        &self,
        name: String,
        directory: Option<String>,
        base_command: Option<String>,
    ) -> Result<Response> {
        if !validate_name(&name) {
            return Err(Error::InvalidName(name));
        }
        let mut site = Site::new(name);
        site.directory = directory.filter(|d| !d.trim().is_empty());
        site.base_command = base_command.filter(|p| !p.trim().is_empty());

        let site = self.supervisor.db().sites().insert(&site).await?;
        info!("Added site {}", site.name);
        Ok(Response::Site { site })
    }

    async fn site_edit(&self, name: &str, update: SiteUpdate) -> Result<Response> {
        let site = self.site_named(name).await?;
        let site = self.supervisor.db().sites().update(site.id, &update).await?;
        Ok(Response::Site { site })
    }

    async fn site_remove(&self, name: &str) -> Result<Response> {
        let site = self.site_named(name).await?;
        let db = self.supervisor.db();

        for command in db.commands().list(Some(site.id)).await? {
            self.supervisor.stop_command(command.id).await?;
            self.supervisor.forget(command.id);
        }
        db.sites().delete(site.id).await?;
        info!("Removed site {}", site.name);
        Ok(Response::Deleted { name: site.name })
    }

    async fn command_add(
        &self,
        site: &str,
        name: String,
        template: String,
        envs: BTreeMap<String, String>,
        active: bool,
    ) -> Result<Response> {
        if !validate_name(&name) {
            return Err(Error::InvalidName(name));
        }
        let site = self.site_named(site).await?;

        let mut command = Command::new(site.id, name, template).with_active(active);
        command.envs = envs;
        let command = self.supervisor.db().commands().insert(&command).await?;

        info!("Added command {}/{}", site.name, command.name);
        Ok(Response::Command { site, command })
    }

    async fn command_edit(&self, target: &CommandRef, update: CommandUpdate) -> Result<Response> {
        if let Some(name) = update.name.as_deref() {
            if !validate_name(name) {
                return Err(Error::InvalidName(name.to_string()));
            }
        }
        let command = self.resolve(target).await?;
        let command = self
            .supervisor
            .db()
            .commands()
            .update(command.id, &update)
            .await?;
        self.command_response(command).await
    }

    async fn command_env(
        &self,
        target: &CommandRef,
        envs: BTreeMap<String, String>,
    ) -> Result<Response> {
        let command = self.resolve(target).await?;
        let commands = self.supervisor.db().commands();
        commands.replace_envs(command.id, &envs).await?;

        let command = commands
            .get_by_id(command.id)
            .await?
            .ok_or_else(|| Error::CommandNotFound(target.to_string()))?;
        self.command_response(command).await
    }

    async fn command_response(&self, command: Command) -> Result<Response> {
        let site = self
            .supervisor
            .db()
            .sites()
            .get_by_id(command.site_id)
            .await?
            .ok_or_else(|| Error::SiteNotFound(command.site_id.to_string()))?;
        Ok(Response::Command { site, command })
    }

    async fn command_list(&self, site: Option<&str>) -> Result<Response> {
        if let Some(name) = site {
            self.site_named(name).await?;
        }
        let commands = self
            .supervisor
            .status()
            .await?
            .into_iter()
            .filter(|info| site.map(|s| info.site.name == s).unwrap_or(true))
            .collect();
        Ok(Response::Commands { commands })
    }

    async fn command_remove(&self, target: &CommandRef) -> Result<Response> {
        let command = self.resolve(target).await?;
        self.supervisor.stop_command(command.id).await?;
        self.supervisor.db().commands().delete(command.id).await?;
        self.supervisor.forget(command.id);

        info!("Removed command {}", target);
        Ok(Response::Deleted {
            name: target.to_string(),
        })
    }

    async fn start(&self, target: &CommandRef) -> Result<Response> {
        info!("Handling start request for {}", target);
        let command = self.resolve(target).await?;
        let started = self.supervisor.start_command(command.id, 0).await?;
        Ok(Response::Started {
            fallback: started.resolution.is_fallback(),
            run: started.run,
        })
    }

    async fn stop(&self, target: &CommandRef) -> Result<Response> {
        info!("Handling stop request for {}", target);
        let command = self.resolve(target).await?;
        let count = self.supervisor.stop_command(command.id).await?;
        Ok(Response::Stopped { count })
    }

    async fn restart(&self, target: &CommandRef) -> Result<Response> {
        info!("Handling restart request for {}", target);
        let command = self.resolve(target).await?;
        let started = self.supervisor.restart_command(command.id).await?;
        Ok(Response::Restarted {
            fallback: started.resolution.is_fallback(),
            run: started.run,
        })
    }

    async fn preview(&self, target: &CommandRef) -> Result<Response> {
        let command = self.resolve(target).await?;
        let line = self.supervisor.preview(command.id).await?;
        Ok(Response::Preview { line })
    }

    async fn logs(
        &self,
        target: &CommandRef,
        lines: Option<usize>,
        grep: Option<&str>,
    ) -> Result<Response> {
        let grep = grep
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::InvalidSelector(format!("bad --grep pattern: {}", e)))?;
        let command = self.resolve(target).await?;
        let lines = self
            .supervisor
            .logs(command.id, lines, grep.as_ref())
            .await?;
        Ok(Response::LogLines { lines })
    }

    async fn runs(&self, target: &CommandRef, limit: usize) -> Result<Response> {
        let command = self.resolve(target).await?;
        let limit = if limit == 0 { DEFAULT_RUNS_LIMIT } else { limit };
        let runs = self
            .supervisor
            .db()
            .runs()
            .get_by_command(command.id, limit)
            .await?;
        Ok(Response::Runs { runs })
    }

    async fn flush(&self, target: &CommandRef) -> Result<Response> {
        info!("Handling flush request for {}", target);
        let command = self.resolve(target).await?;
        let count = self
            .supervisor
            .db()
            .logs()
            .delete_by_command(command.id)
            .await?;
        Ok(Response::Flushed { count })
    }
}
