// Status reporting - read-only views over the process table

use crate::error::{Result, SupervisorError};
use crate::process::monitor::ResourceSampler;
use crate::process::{ProcessState, ProcessSupervisor};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Persistent notice that an app gave up restarting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureAlert {
    pub name: String,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
    pub raised_at: SystemTime,
}

/// Shared list of active failure alerts, one per app at most.
/// An alert stays until the app is started manually again.
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    alerts: Arc<Mutex<Vec<FailureAlert>>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, alert: FailureAlert) {
        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        alerts.retain(|a| a.name != alert.name);
        alerts.push(alert);
    }

    pub fn clear(&self, name: &str) {
        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        alerts.retain(|a| a.name != name);
    }

    pub fn active(&self) -> Vec<FailureAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// One entry as of the snapshot instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Time since the last transition to Running, while running
    pub uptime: Option<Duration>,
    pub started_at: Option<SystemTime>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub last_exit_signal: Option<i32>,
    pub budget_exhausted: bool,
    pub cpu_usage: Option<f32>,
    pub memory_usage: Option<u64>,
}

/// Point-in-time view of the whole table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub taken_at: SystemTime,
    pub entries: Vec<EntryStatus>,
    pub alerts: Vec<FailureAlert>,
}

impl StatusSnapshot {
    pub fn get(&self, name: &str) -> Option<&EntryStatus> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Keep only `name`, failing if it is unknown
    pub fn retain_app(mut self, name: &str) -> Result<StatusSnapshot> {
        self.entries.retain(|e| e.name == name);
        if self.entries.is_empty() {
            return Err(SupervisorError::AppNotFound(name.to_string()));
        }
        self.alerts.retain(|a| a.name == name);
        Ok(self)
    }
}

/// Aggregates entry state for external inspection; never mutates entries
pub struct StatusReporter {
    supervisor: ProcessSupervisor,
    sampler: tokio::sync::Mutex<ResourceSampler>,
}

impl StatusReporter {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self {
            supervisor,
            sampler: tokio::sync::Mutex::new(ResourceSampler::new()),
        }
    }

    /// Snapshot every entry at one instant.
    ///
    /// Entry locks are taken in load order and all held while copying the
    /// records and the alert list. Alerts are only raised or cleared under an
    /// entry lock, so both halves describe the same instant. Mutators only
    /// ever hold one entry lock, so the ordered acquisition cannot deadlock.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let mut guards = Vec::new();
        for slot in self.supervisor.slots() {
            guards.push(slot.entry.lock().await);
        }

        let taken_at = SystemTime::now();
        let entries: Vec<EntryStatus> = guards
            .iter()
            .map(|entry| EntryStatus {
                name: entry.name().to_string(),
                state: entry.state,
                pid: entry.pid,
                uptime: entry.uptime(),
                started_at: entry.started_at,
                restart_count: entry.restart_count,
                last_exit_code: entry.last_exit_code,
                last_exit_signal: entry.last_exit_signal,
                budget_exhausted: entry.budget_exhausted,
                cpu_usage: None,
                memory_usage: None,
            })
            .collect();
        let alerts = self.supervisor.alerts().active();
        drop(guards);

        let mut snapshot = StatusSnapshot {
            taken_at,
            entries,
            alerts,
        };
        self.annotate_usage(&mut snapshot).await;
        snapshot
    }

    /// Snapshot a single app
    pub async fn snapshot_app(&self, name: &str) -> Result<StatusSnapshot> {
        if !self.supervisor.contains(name) {
            return Err(SupervisorError::AppNotFound(name.to_string()));
        }
        self.snapshot().await.retain_app(name)
    }

    async fn annotate_usage(&self, snapshot: &mut StatusSnapshot) {
        let pids: Vec<u32> = snapshot.entries.iter().filter_map(|e| e.pid).collect();
        let usage = self.sampler.lock().await.sample(&pids);

        for entry in snapshot.entries.iter_mut() {
            if let Some(sample) = entry.pid.and_then(|pid| usage.get(&pid)) {
                entry.cpu_usage = Some(sample.cpu_usage);
                entry.memory_usage = Some(sample.memory_usage);
            }
        }
    }
}
