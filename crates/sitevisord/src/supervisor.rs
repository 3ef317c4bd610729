//! Process supervisor - runs commands, watches them and restarts crashes

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use sitevisor_core::{
    Command, CommandInfo, CommandState, DaemonConfig, Error, Result, Run, Site,
};
use sitevisor_db::Database;
use sitevisor_logs::{CommandLog, LogReader, OutputStreamer};
use sitevisor_notify::{CommandEvent, Notifier};
use sitevisor_runtime::{
    build_command, detect_lister, kill_pid, process_exists, ProcessLister, Resolution, Resolver,
    Runner, ShellRunner,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::killer::{match_patterns, ProcessKiller};

/// How long `close` waits for each background loop
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Ask the restart worker to start a command again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub command_id: u32,
    pub restart_count: u32,
}

/// A successful start
#[derive(Debug, Clone)]
pub struct StartedRun {
    pub run: Run,
    pub resolution: Resolution,
}

struct Inner {
    db: Database,
    config: DaemonConfig,
    resolver: Resolver,
    runner: Arc<dyn Runner>,
    killer: ProcessKiller,
    notifier: Arc<dyn Notifier>,
    /// In-memory state per command id
    states: RwLock<HashMap<u32, CommandState>>,
    /// Cancellation token per live run id
    tokens: RwLock<HashMap<u32, CancellationToken>>,
    /// Serializes start, stop and restart of the same command
    command_locks: Mutex<HashMap<u32, Arc<AsyncMutex<()>>>>,
    /// Restarts in the current crash streak per command id
    streaks: RwLock<HashMap<u32, u32>>,
    restart_tx: mpsc::UnboundedSender<RestartRequest>,
    shutdown: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to the supervisor service
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Start the supervisor with the best available process lister
    pub async fn open(
        db: Database,
        config: DaemonConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::open_with(db, config, notifier, detect_lister()).await
    }

    pub async fn open_with(
        db: Database,
        config: DaemonConfig,
        notifier: Arc<dyn Notifier>,
        lister: Arc<dyn ProcessLister>,
    ) -> Result<Self> {
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        info!("Process lister: {}", lister.name());

        let killer = ProcessKiller::new(lister, db.runs(), config.kill_grace());
        let supervisor = Self {
            inner: Arc::new(Inner {
                resolver: Resolver::new(config.fallback.clone()),
                runner: Arc::new(ShellRunner::default()),
                killer,
                notifier,
                states: RwLock::new(HashMap::new()),
                tokens: RwLock::new(HashMap::new()),
                command_locks: Mutex::new(HashMap::new()),
                streaks: RwLock::new(HashMap::new()),
                restart_tx,
                shutdown: CancellationToken::new(),
                loops: Mutex::new(Vec::new()),
                db,
                config,
            }),
        };

        // Pick up runs orphaned by a previous daemon before serving requests
        let handled = supervisor.reconcile().await;
        if handled > 0 {
            info!("Reconciled {} dead run(s) at startup", handled);
        }

        let reconciler = supervisor.spawn_reconciliation_loop();
        let worker = supervisor.spawn_restart_worker(restart_rx);
        supervisor.inner.loops.lock().extend([reconciler, worker]);

        Ok(supervisor)
    }

    /// Stop the background loops. Running children are left alone.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.loops.lock());
        for handle in handles {
            if tokio::time::timeout(LOOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("Supervisor loop did not exit within {:?}", LOOP_JOIN_TIMEOUT);
            }
        }
        info!("Supervisor closed");
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    fn state(&self, command_id: u32) -> Option<CommandState> {
        self.inner.states.read().get(&command_id).copied()
    }

    fn set_state(&self, command_id: u32, state: CommandState) {
        self.inner.states.write().insert(command_id, state);
    }

    fn command_lock(&self, command_id: u32) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.inner
                .command_locks
                .lock()
                .entry(command_id)
                .or_default(),
        )
    }

    fn cancel_run(&self, run_id: u32) {
        if let Some(token) = self.inner.tokens.write().remove(&run_id) {
            token.cancel();
        }
    }

    async fn load(&self, command_id: u32) -> Result<(Site, Command)> {
        let command = self
            .inner
            .db
            .commands()
            .get_by_id(command_id)
            .await?
            .ok_or_else(|| Error::CommandNotFound(command_id.to_string()))?;
        let site = self
            .inner
            .db
            .sites()
            .get_by_id(command.site_id)
            .await?
            .ok_or_else(|| Error::SiteNotFound(command.site_id.to_string()))?;
        Ok((site, command))
    }

    fn command_log(&self, site: &Site, command: &Command) -> CommandLog {
        CommandLog::new(
            self.inner.db.logs(),
            Some(site.id),
            Some(command.id),
            format!("{}/{}", site.name, command.name),
        )
    }

    /// Deliver an event without waiting for it
    fn notify(&self, event: CommandEvent) {
        let notifier = Arc::clone(&self.inner.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send_event(&event).await {
                warn!("Failed to send notification: {}", e);
            }
        });
    }

    /// Start a command. `restart_count` is 0 for operator starts and the
    /// attempt number for automatic restarts.
    pub async fn start_command(&self, command_id: u32, restart_count: u32) -> Result<StartedRun> {
        let lock = self.command_lock(command_id);
        let _guard = lock.lock().await;
        self.start_locked(command_id, restart_count).await
    }

    /// Body of `start_command`; the caller holds the command lock
    async fn start_locked(&self, command_id: u32, restart_count: u32) -> Result<StartedRun> {
        let (site, command) = self.load(command_id).await?;
        let log = self.command_log(&site, &command);
        let label = log.label().to_string();

        if restart_count == 0 {
            self.inner.streaks.write().remove(&command_id);
            for run in self.inner.db.runs().live_for_command(command_id).await? {
                match run.pid {
                    Some(pid) if process_exists(pid) => return Err(Error::AlreadyRunning(label)),
                    _ => {
                        self.inner.db.runs().close(run.id, None).await?;
                        self.cancel_run(run.id);
                        log.warning(format!("Closed stale run {} whose process is gone", run.id))
                            .await;
                    }
                }
            }
        }
        if !command.active {
            return Err(Error::CommandInactive(label));
        }

        self.set_state(command_id, CommandState::Starting);
        let started = self.spawn_run(&site, &command, restart_count, &log).await;
        if started.is_err() {
            self.set_state(command_id, CommandState::Idle);
        }
        started
    }

    async fn spawn_run(
        &self,
        site: &Site,
        command: &Command,
        restart_count: u32,
        log: &CommandLog,
    ) -> Result<StartedRun> {
        let patterns = match_patterns(site, command, &self.inner.config.fallback);
        let killed = self.inner.killer.kill_matching(&patterns, log).await;
        if killed > 0 {
            info!("[{}] reclaimed {} stray process(es)", log.label(), killed);
        }

        let resolution = match self.inner.resolver.resolve(site, command, &command.envs) {
            Ok(resolution) => resolution,
            Err(e) => {
                if let Error::ExecutableNotFound {
                    program,
                    command_line,
                } = &e
                {
                    log.error(format!(
                        "Executable '{}' not found, cannot run: {}",
                        program, command_line
                    ))
                    .await;
                }
                return Err(e);
            }
        };
        if let Resolution::Fallback { line, missing } = &resolution {
            log.error(format!(
                "Executable '{}' not found, cannot run: {}",
                missing,
                build_command(site, command, &command.envs)
            ))
            .await;
            log.warning(format!("Using fallback command: {}", line)).await;
        }

        let running = match self.inner.runner.start(resolution.line()).await {
            Ok(running) => running,
            Err(e) => {
                log.error(format!("Failed to start: {}", e)).await;
                return Err(e);
            }
        };
        let pid = running.pid;
        let mut child = running.child;

        let run = match self
            .inner
            .db
            .runs()
            .insert(command.id, Some(pid), restart_count)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!("[{}] could not record run for pid {}: {}", log.label(), pid, e);
                if let Err(kill_err) = kill_pid(pid, self.inner.config.kill_grace()).await {
                    warn!("Failed to kill unrecorded pid {}: {}", pid, kill_err);
                }
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        self.inner.tokens.write().insert(run.id, token.clone());
        // Before the wait task exists, so a fast exit cannot be overwritten
        self.set_state(command.id, CommandState::Running);

        OutputStreamer::new(log.clone(), token.clone())
            .spawn_capture(child.stdout.take(), child.stderr.take());
        self.spawn_wait_task(run.clone(), child, token, log.clone());

        log.info(format!(
            "Started process {} (run {}, restart {})",
            pid, run.id, restart_count
        ))
        .await;
        if restart_count == 0 {
            self.notify(CommandEvent::Started {
                site: site.name.clone(),
                command: command.name.clone(),
                pid,
            });
        }

        Ok(StartedRun { run, resolution })
    }

    fn spawn_wait_task(&self, run: Run, mut child: Child, token: CancellationToken, log: CommandLog) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                _ = token.cancelled() => {
                    debug!("[{}] wait task for run {} cancelled", log.label(), run.id);
                    return;
                }
                status = child.wait() => status,
            };

            let exit_code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("[{}] failed to wait for run {}: {}", log.label(), run.id, e);
                    None
                }
            };
            supervisor.inner.tokens.write().remove(&run.id);
            supervisor.on_exit(run, exit_code, log).await;
        });
    }

    async fn on_exit(&self, run: Run, exit_code: Option<i32>, log: CommandLog) {
        let pid = run.pid.unwrap_or_default();
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none (killed by signal)".to_string());

        let crashed = match self.inner.db.runs().close_if_crashed(run.id, exit_code).await {
            Ok(closed) => closed,
            Err(e) => {
                error!("[{}] failed to close run {}: {}", log.label(), run.id, e);
                return;
            }
        };

        log.info(format!("Process {} exited with code {}", pid, code)).await;
        if !crashed {
            // Stopped by an operator or already closed by reconciliation
            return;
        }

        if exit_code == Some(0) {
            self.set_state(run.command_id, CommandState::Idle);
            return;
        }

        log.warning(format!("Process {} died unexpectedly", pid)).await;
        self.handle_crash(&run, exit_code, &log).await;
    }

    /// Notify and schedule the next attempt, or give up
    async fn handle_crash(&self, run: &Run, exit_code: Option<i32>, log: &CommandLog) {
        let (site, command) = match self.load(run.command_id).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Not restarting run {}: {}", run.id, e);
                self.set_state(run.command_id, CommandState::Idle);
                return;
            }
        };

        let policy = &self.inner.config.restart;
        let streak = self
            .inner
            .streaks
            .read()
            .get(&run.command_id)
            .copied()
            .unwrap_or(run.restart_count);
        let attempt = policy.next_in_streak(streak, Duration::from_secs(run.uptime_secs()));
        if !policy.allows(attempt) {
            log.error(format!("Giving up after {} restarts", streak)).await;
            self.inner.streaks.write().remove(&run.command_id);
            self.set_state(run.command_id, CommandState::Idle);
            self.notify(CommandEvent::GaveUp {
                site: site.name,
                command: command.name,
                restarts: streak,
            });
            return;
        }
        if attempt < streak {
            debug!("[{}] stable run crashed, new restart streak", log.label());
        }
        self.inner.streaks.write().insert(run.command_id, attempt);
        let next = run.restart_count + 1;

        self.set_state(run.command_id, CommandState::Restarting);
        self.notify(CommandEvent::Crashed {
            site: site.name,
            command: command.name,
            exit_code,
        });

        let delay = policy.delay_for(attempt);
        log.info(format!("Restarting in {} ms (attempt {})", delay.as_millis(), next))
            .await;

        let request = RestartRequest {
            command_id: run.command_id,
            restart_count: next,
        };
        let tx = self.inner.restart_tx.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if tx.send(request).is_err() {
                debug!("Restart worker gone, dropping {:?}", request);
            }
        });
    }

    fn spawn_restart_worker(
        &self,
        mut rx: mpsc::UnboundedReceiver<RestartRequest>,
    ) -> JoinHandle<()> {
        let supervisor = self.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = rx.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                };
                supervisor.handle_restart(request).await;
            }
            debug!("Restart worker exiting");
        })
    }

    async fn handle_restart(&self, request: RestartRequest) {
        let lock = self.command_lock(request.command_id);
        let _guard = lock.lock().await;

        // A stop or manual start since the crash supersedes this request
        if self.state(request.command_id) != Some(CommandState::Restarting) {
            debug!("Skipping stale {:?}", request);
            return;
        }

        match self
            .start_locked(request.command_id, request.restart_count)
            .await
        {
            Ok(started) => info!(
                "Restarted command {} as run {} (attempt {})",
                request.command_id, started.run.id, request.restart_count
            ),
            Err(Error::CommandInactive(name)) => {
                info!("Not restarting inactive command {}", name);
            }
            Err(e) => warn!("Restart of command {} failed: {}", request.command_id, e),
        }
    }

    fn spawn_reconciliation_loop(&self) -> JoinHandle<()> {
        let supervisor = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.config.poll_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes at once; open() already ran a pass
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        supervisor.reconcile().await;
                    }
                }
            }
            debug!("Reconciliation loop exiting");
        })
    }

    /// One pass over live runs; returns how many dead runs were handled
    pub async fn reconcile(&self) -> usize {
        let live = match self.inner.db.runs().list_live().await {
            Ok(runs) => runs,
            Err(e) => {
                error!("Reconciliation could not list live runs: {}", e);
                return 0;
            }
        };

        let mut handled = 0;
        for run in live {
            match self.reconcile_run(&run).await {
                Ok(true) => handled += 1,
                Ok(false) => {}
                Err(e) => error!("Reconciliation failed for run {}: {}", run.id, e),
            }
        }
        handled
    }

    async fn reconcile_run(&self, run: &Run) -> Result<bool> {
        if run.pid.map(process_exists).unwrap_or(false) {
            return Ok(false);
        }
        let runs = self.inner.db.runs();

        if run.manually_stopped {
            runs.close(run.id, None).await?;
            self.cancel_run(run.id);
            return Ok(true);
        }

        if !runs.close_if_crashed(run.id, None).await? {
            return Ok(false);
        }
        self.cancel_run(run.id);

        let (site, command) = self.load(run.command_id).await?;
        let log = self.command_log(&site, &command);
        log.warning(format!(
            "Process {} disappeared without being stopped",
            run.pid.unwrap_or_default()
        ))
        .await;
        self.handle_crash(run, None, &log).await;
        Ok(true)
    }

    /// Stop every live run of a command. Returns how many were stopped.
    pub async fn stop_command(&self, command_id: u32) -> Result<usize> {
        let lock = self.command_lock(command_id);
        let _guard = lock.lock().await;
        self.stop_locked(command_id).await
    }

    /// Body of `stop_command`; the caller holds the command lock
    async fn stop_locked(&self, command_id: u32) -> Result<usize> {
        let (site, command) = self.load(command_id).await?;
        let log = self.command_log(&site, &command);

        self.set_state(command_id, CommandState::Stopping);
        let result = self.stop_live_runs(command_id, &log).await;
        self.set_state(command_id, CommandState::Idle);
        let stopped = result?;

        if stopped > 0 {
            log.info("Stopped by operator").await;
            self.notify(CommandEvent::Stopped {
                site: site.name,
                command: command.name,
            });
        }
        Ok(stopped)
    }

    async fn stop_live_runs(&self, command_id: u32, log: &CommandLog) -> Result<usize> {
        let runs = self.inner.db.runs();
        let mut stopped = 0;

        for run in runs.live_for_command(command_id).await? {
            // Flag first so the exit-wait path never sees a crash
            runs.mark_manually_stopped(run.id).await?;

            if let Some(pid) = run.pid {
                if let Err(e) = kill_pid(pid, self.inner.config.kill_grace()).await {
                    log.warning(format!("Could not kill process {}: {}", pid, e))
                        .await;
                }
            }

            runs.close(run.id, None).await?;
            self.cancel_run(run.id);
            stopped += 1;
        }
        Ok(stopped)
    }

    pub async fn restart_command(&self, command_id: u32) -> Result<StartedRun> {
        let lock = self.command_lock(command_id);
        let _guard = lock.lock().await;
        self.stop_locked(command_id).await?;
        self.start_locked(command_id, 0).await
    }

    /// The line `start_command` would run, without resolving it
    pub async fn preview(&self, command_id: u32) -> Result<String> {
        let (site, command) = self.load(command_id).await?;
        Ok(build_command(&site, &command, &command.envs))
    }

    pub async fn status(&self) -> Result<Vec<CommandInfo>> {
        let db = &self.inner.db;
        let sites: HashMap<u32, Site> = db
            .sites()
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut infos = Vec::new();
        for command in db.commands().list(None).await? {
            let Some(site) = sites.get(&command.site_id) else {
                continue;
            };
            let latest = db.runs().get_latest(command.id).await?;
            let state = self.state(command.id).unwrap_or_else(|| {
                if latest.as_ref().map(Run::is_live).unwrap_or(false) {
                    CommandState::Running
                } else {
                    CommandState::Idle
                }
            });
            infos.push(CommandInfo::new(site.clone(), command, state, latest));
        }
        Ok(infos)
    }

    /// Last log lines of a command, oldest first
    pub async fn logs(
        &self,
        command_id: u32,
        lines: Option<usize>,
        grep: Option<&Regex>,
    ) -> Result<Vec<String>> {
        LogReader::new(self.inner.db.logs())
            .tail(command_id, lines, grep)
            .await
    }

    /// Forget a command's in-memory state after it was deleted
    pub fn forget(&self, command_id: u32) {
        self.inner.states.write().remove(&command_id);
        self.inner.streaks.write().remove(&command_id);
        self.inner.command_locks.lock().remove(&command_id);
    }
}
