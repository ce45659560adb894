use crate::config::{AppDescriptor, SupervisorConfig, SupervisorPolicy};
use crate::error::{Result, SupervisorError};
use crate::process::restart::{RestartDecision, RestartPolicy};
use crate::process::spawner::{spawn_app, SpawnedProcess};
use crate::process::types::{ExitInfo, ProcessEntry, ProcessState};
use crate::status::{AlertLog, FailureAlert};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::process::Child;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Result of a `start` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            StartOutcome::Started { pid } | StartOutcome::AlreadyRunning { pid } => *pid,
        }
    }
}

impl std::fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartOutcome::Started { pid } => write!(f, "started (pid {})", pid),
            StartOutcome::AlreadyRunning { pid } => write!(f, "already running (pid {})", pid),
        }
    }
}

/// Result of a `stop` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { exit: ExitInfo, forced: bool },
    AlreadyStopped,
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::Stopped { exit, forced: false } => write!(f, "stopped ({})", exit),
            StopOutcome::Stopped { exit, forced: true } => write!(f, "force-killed ({})", exit),
            StopOutcome::AlreadyStopped => write!(f, "already stopped"),
        }
    }
}

/// Registry slot for one app.
///
/// `commands` serialises lifecycle commands for the app (tokio's mutex is
/// fair, so they run in submission order). `entry` guards the record and is
/// only ever held briefly, never across a spawn wait or grace period.
pub(crate) struct Slot {
    pub(crate) descriptor: Arc<AppDescriptor>,
    commands: Mutex<()>,
    pub(crate) entry: Mutex<ProcessEntry>,
}

struct Inner {
    slots: HashMap<String, Arc<Slot>>,
    order: Vec<String>,
    policy: SupervisorPolicy,
    restart_policy: RestartPolicy,
    alerts: AlertLog,
}

/// Owns one process entry per descriptor and drives their lifecycle.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    /// Build the registry from a validated configuration. No process is started.
    pub fn new(config: SupervisorConfig) -> Self {
        let mut slots = HashMap::with_capacity(config.apps.len());
        let mut order = Vec::with_capacity(config.apps.len());

        for app in config.apps {
            let descriptor = Arc::new(app);
            order.push(descriptor.name.clone());
            slots.insert(
                descriptor.name.clone(),
                Arc::new(Slot {
                    descriptor: Arc::clone(&descriptor),
                    commands: Mutex::new(()),
                    entry: Mutex::new(ProcessEntry::new(descriptor)),
                }),
            );
        }

        Self {
            inner: Arc::new(Inner {
                slots,
                order,
                restart_policy: RestartPolicy::from_policy(&config.policy),
                policy: config.policy,
                alerts: AlertLog::new(),
            }),
        }
    }

    /// App names in load order
    pub fn names(&self) -> &[String] {
        &self.inner.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.slots.contains_key(name)
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.inner.alerts
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &Arc<Slot>> {
        self.inner
            .order
            .iter()
            .filter_map(|name| self.inner.slots.get(name))
    }

    fn slot(&self, name: &str) -> Result<Arc<Slot>> {
        self.inner
            .slots
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::AppNotFound(name.to_string()))
    }

    /// Run `f` against the current record of `name`
    pub async fn inspect<R>(&self, name: &str, f: impl FnOnce(&ProcessEntry) -> R) -> Result<R> {
        let slot = self.slot(name)?;
        let entry = slot.entry.lock().await;
        Ok(f(&entry))
    }

    /// Start `name` unless it already has a live process
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        let slot = self.slot(name)?;
        let _commands = slot.commands.lock().await;
        self.start_locked(&slot).await
    }

    /// Stop `name`, escalating to SIGKILL after the grace period
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        let slot = self.slot(name)?;
        let _commands = slot.commands.lock().await;
        self.stop_locked(&slot).await
    }

    /// Stop then start `name` with no other command on it in between
    pub async fn restart(&self, name: &str) -> Result<StartOutcome> {
        let slot = self.slot(name)?;
        let _commands = slot.commands.lock().await;
        self.stop_locked(&slot).await?;
        self.start_locked(&slot).await
    }

    async fn start_locked(&self, slot: &Arc<Slot>) -> Result<StartOutcome> {
        let name = slot.descriptor.name.as_str();

        {
            let mut entry = slot.entry.lock().await;
            if let (true, Some(pid)) = (entry.state.is_live(), entry.pid) {
                debug!(app = name, pid, "already running");
                return Ok(StartOutcome::AlreadyRunning { pid });
            }

            if let Some(timer) = entry.pending_restart.take() {
                timer.abort();
            }
            entry.consecutive_crashes = 0;
            entry.budget_exhausted = false;
            self.inner.alerts.clear(name);
            entry.mark_starting();
        }

        let spawned = spawn_app(&slot.descriptor);

        let mut entry = slot.entry.lock().await;
        match spawned {
            Ok(spawned) => {
                let pid = self.attach(slot, &mut entry, spawned);
                info!(app = name, pid, "started");
                Ok(StartOutcome::Started { pid })
            }
            Err(e) => {
                entry.mark_stopped();
                warn!(app = name, "start failed: {}", e);
                Err(e)
            }
        }
    }

    async fn stop_locked(&self, slot: &Arc<Slot>) -> Result<StopOutcome> {
        let name = slot.descriptor.name.as_str();
        let stop_signal = parse_signal(&slot.descriptor.stop_signal)?;

        let (pid, generation, mut exit_rx) = {
            let mut entry = slot.entry.lock().await;
            match (entry.state, entry.pid, entry.exit.clone()) {
                (ProcessState::Stopped, _, _) => return Ok(StopOutcome::AlreadyStopped),
                (ProcessState::Crashed, _, _) => {
                    entry.mark_stopped();
                    info!(app = name, "stopped crashed app, pending restart cancelled");
                    return Ok(StopOutcome::AlreadyStopped);
                }
                (_, Some(pid), Some(exit_rx)) => {
                    entry.mark_stopping();
                    (pid, entry.generation, exit_rx)
                }
                _ => {
                    entry.mark_stopped();
                    return Ok(StopOutcome::AlreadyStopped);
                }
            }
        };

        info!(
            app = name,
            pid,
            signal = slot.descriptor.stop_signal.as_str(),
            "stopping"
        );
        if let Err(e) = signal_group(pid, stop_signal) {
            self.abort_stop(slot, generation).await;
            return Err(e);
        }

        let grace = self.inner.policy.grace_period();
        let (exit, forced) = match tokio::time::timeout(grace, wait_exit(&mut exit_rx)).await {
            Ok(exit) => (exit, false),
            Err(_) => {
                warn!(
                    "{}",
                    SupervisorError::GracefulStopTimeout {
                        name: name.to_string(),
                        grace,
                    }
                );
                if let Err(e) = signal_group(pid, Signal::SIGKILL) {
                    self.abort_stop(slot, generation).await;
                    return Err(e);
                }
                (wait_exit(&mut exit_rx).await, true)
            }
        };

        let mut entry = slot.entry.lock().await;
        entry.record_exit(exit);
        entry.mark_stopped();
        info!(app = name, %exit, forced, "stopped");

        Ok(StopOutcome::Stopped { exit, forced })
    }

    /// Undo a stop whose signal could not be delivered
    async fn abort_stop(&self, slot: &Arc<Slot>, generation: u64) {
        let mut entry = slot.entry.lock().await;
        if entry.generation == generation && entry.state == ProcessState::Stopping {
            entry.state = ProcessState::Running;
        }
    }

    /// Record a fresh child in `entry` and hand the child to an exit monitor
    fn attach(&self, slot: &Arc<Slot>, entry: &mut ProcessEntry, spawned: SpawnedProcess) -> u32 {
        let generation = entry.generation + 1;
        let (exit_tx, exit_rx) = watch::channel(None);
        entry.mark_running(spawned.pid, generation, exit_rx);

        tokio::spawn(self.clone().monitor_exit(
            Arc::clone(slot),
            generation,
            spawned.child,
            exit_tx,
        ));

        spawned.pid
    }

    /// Wait for one run to end and classify the exit
    async fn monitor_exit(
        self,
        slot: Arc<Slot>,
        generation: u64,
        mut child: Child,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let name = slot.descriptor.name.as_str();
        let exit = match child.wait().await {
            Ok(status) => ExitInfo::from(status),
            Err(e) => {
                warn!(app = name, "failed to wait on child: {}", e);
                ExitInfo::unknown()
            }
        };
        exit_tx.send_replace(Some(exit));

        let mut entry = slot.entry.lock().await;
        if entry.generation != generation {
            return;
        }
        match entry.state {
            ProcessState::Running => self.handle_crash(&slot, &mut entry, Some(exit)),
            state => debug!(app = name, %exit, %state, "exit observed by lifecycle command"),
        }
    }

    /// Move a crashed entry to Crashed and either arm a restart timer or give up
    fn handle_crash(&self, slot: &Arc<Slot>, entry: &mut ProcessEntry, exit: Option<ExitInfo>) {
        let name = slot.descriptor.name.as_str();
        let policy = &self.inner.restart_policy;

        if policy.resets_after(entry.uptime()) {
            entry.consecutive_crashes = 0;
        }
        if let Some(exit) = exit {
            entry.record_exit(exit);
        }
        entry.mark_crashed();
        entry.restart_count += 1;
        entry.consecutive_crashes += 1;

        let reason = exit
            .map(|e| e.to_string())
            .unwrap_or_else(|| "spawn failure".to_string());

        match policy.decide(entry.consecutive_crashes) {
            RestartDecision::RestartAfter(delay) => {
                warn!(
                    app = name,
                    restart_count = entry.restart_count,
                    "crashed ({}), restarting in {:?}",
                    reason,
                    delay
                );
                let supervisor = self.clone();
                let slot = Arc::clone(slot);
                let generation = entry.generation;
                entry.pending_restart = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    supervisor.restart_after_crash(slot, generation).await;
                }));
            }
            RestartDecision::GiveUp => {
                entry.budget_exhausted = true;
                error!(
                    app = name,
                    "{}",
                    SupervisorError::RestartBudgetExhausted {
                        name: name.to_string(),
                        restarts: entry.consecutive_crashes - 1,
                    }
                );
                self.inner.alerts.raise(FailureAlert {
                    name: name.to_string(),
                    restart_count: entry.restart_count,
                    last_exit_code: entry.last_exit_code,
                    last_exit_signal: entry.last_exit_signal,
                    raised_at: SystemTime::now(),
                });
            }
        }
    }

    /// Timer callback: respawn unless a lifecycle command got there first
    async fn restart_after_crash(self, slot: Arc<Slot>, generation: u64) {
        let name = slot.descriptor.name.as_str();
        let _commands = slot.commands.lock().await;

        {
            let mut entry = slot.entry.lock().await;
            if entry.generation != generation
                || entry.state != ProcessState::Crashed
                || entry.budget_exhausted
            {
                debug!(app = name, "restart timer superseded");
                return;
            }
            // The handle belongs to this task
            entry.pending_restart = None;
            entry.mark_starting();
        }

        let spawned = spawn_app(&slot.descriptor);

        let mut entry = slot.entry.lock().await;
        match spawned {
            Ok(spawned) => {
                let pid = self.attach(&slot, &mut entry, spawned);
                info!(
                    app = name,
                    pid,
                    restart_count = entry.restart_count,
                    "restarted after crash"
                );
            }
            Err(e) => {
                error!(app = name, "automatic restart failed: {}", e);
                self.handle_crash(&slot, &mut entry, None);
            }
        }
    }
}

/// Wait until the monitor publishes the exit of the run behind `rx`
async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> ExitInfo {
    rx.wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|exit| *exit)
        .unwrap_or_else(ExitInfo::unknown)
}

fn parse_signal(signal_name: &str) -> Result<Signal> {
    signal_name
        .parse::<Signal>()
        .map_err(|_| SupervisorError::Signal(format!("Invalid signal name: {}", signal_name)))
}

/// Signal the process group led by `pid`. A group that is already gone is fine.
fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SupervisorError::Signal(format!(
            "Failed to send {} to process group {}: {}",
            signal, pid, e
        ))),
    }
}

#[cfg(test)]
mod tests;
