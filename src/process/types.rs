use crate::config::AppDescriptor;
use serde::{Deserialize, Serialize};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl ProcessState {
    /// Whether a child process may exist for an entry in this state
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Crashed => write!(f, "crashed"),
        }
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit that could not be observed (wait failed or spawn never happened)
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// Runtime record tracking one descriptor's process
#[derive(Debug)]
pub struct ProcessEntry {
    pub descriptor: Arc<AppDescriptor>,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Total automatic restarts triggered by crashes
    pub restart_count: u32,
    /// Crashes since the last manual start or long-enough run
    pub consecutive_crashes: u32,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
    pub running_since: Option<Instant>,
    pub started_at: Option<SystemTime>,
    /// Set when the restart budget ran out; like the failure alert, it
    /// survives `stop` and is cleared only by the next manual start
    pub budget_exhausted: bool,
    /// Identifies the current run; bumped on every spawn and stop
    pub(crate) generation: u64,
    pub(crate) exit: Option<watch::Receiver<Option<ExitInfo>>>,
    pub(crate) pending_restart: Option<JoinHandle<()>>,
}

impl ProcessEntry {
    pub fn new(descriptor: Arc<AppDescriptor>) -> Self {
        Self {
            descriptor,
            state: ProcessState::Stopped,
            pid: None,
            restart_count: 0,
            consecutive_crashes: 0,
            last_exit_code: None,
            last_exit_signal: None,
            running_since: None,
            started_at: None,
            budget_exhausted: false,
            generation: 0,
            exit: None,
            pending_restart: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.running_since.map(|since| since.elapsed())
    }

    pub(crate) fn mark_starting(&mut self) {
        self.state = ProcessState::Starting;
    }

    pub(crate) fn mark_running(
        &mut self,
        pid: u32,
        generation: u64,
        exit: watch::Receiver<Option<ExitInfo>>,
    ) {
        self.state = ProcessState::Running;
        self.pid = Some(pid);
        self.generation = generation;
        self.exit = Some(exit);
        self.running_since = Some(Instant::now());
        self.started_at = Some(SystemTime::now());
    }

    pub(crate) fn mark_stopping(&mut self) {
        self.state = ProcessState::Stopping;
    }

    /// Settle into Stopped, invalidating any timer or monitor of the old run
    pub(crate) fn mark_stopped(&mut self) {
        self.state = ProcessState::Stopped;
        self.clear_run();
        self.generation += 1;
        if let Some(timer) = self.pending_restart.take() {
            timer.abort();
        }
    }

    pub(crate) fn mark_crashed(&mut self) {
        self.state = ProcessState::Crashed;
        self.clear_run();
    }

    pub(crate) fn record_exit(&mut self, exit: ExitInfo) {
        self.last_exit_code = exit.code;
        self.last_exit_signal = exit.signal;
    }

    fn clear_run(&mut self) {
        self.pid = None;
        self.exit = None;
        self.running_since = None;
        self.started_at = None;
    }
}
