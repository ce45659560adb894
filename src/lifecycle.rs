// Lifecycle controller - batch and per-app commands over the supervisor

use crate::error::{Result, SupervisorError};
use crate::process::{ProcessSupervisor, StartOutcome, StopOutcome};
use crate::status::{StatusReporter, StatusSnapshot};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Which apps a command applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    All,
    App(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::All => write!(f, "all apps"),
            Target::App(name) => write!(f, "{}", name),
        }
    }
}

/// Outcome of a command applied to several apps.
/// Failures never abort the batch.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub completed: Vec<(String, T)>,
    pub failed: Vec<(String, SupervisorError)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Collapse into a result; any failure becomes an `Aggregate` error
    pub fn into_result(self) -> Result<Vec<(String, T)>> {
        if self.failed.is_empty() {
            Ok(self.completed)
        } else {
            Err(SupervisorError::Aggregate(
                self.failed
                    .into_iter()
                    .map(|(name, e)| (name, e.to_string()))
                    .collect(),
            ))
        }
    }
}

/// Start/stop/restart/status across all supervised apps
pub struct LifecycleController {
    supervisor: ProcessSupervisor,
    reporter: StatusReporter,
}

impl LifecycleController {
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self {
            reporter: StatusReporter::new(supervisor.clone()),
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Start every app in load order, continuing past failures
    pub async fn start_all(&self) -> BatchReport<StartOutcome> {
        let mut report = BatchReport::default();

        for name in self.supervisor.names() {
            match self.supervisor.start(name).await {
                Ok(outcome) => report.completed.push((name.clone(), outcome)),
                Err(e) => {
                    warn!(app = name.as_str(), "start failed: {}", e);
                    report.failed.push((name.clone(), e));
                }
            }
        }

        info!(
            started = report.completed.len(),
            failed = report.failed.len(),
            "start_all finished"
        );
        report
    }

    /// Stop every app concurrently; the report lists apps in load order
    pub async fn stop_all(&self) -> BatchReport<StopOutcome> {
        let mut tasks = JoinSet::new();
        for (index, name) in self.supervisor.names().iter().enumerate() {
            let supervisor = self.supervisor.clone();
            let name = name.clone();
            tasks.spawn(async move {
                let result = supervisor.stop(&name).await;
                (index, name, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("stop task failed: {}", e),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (_, name, result) in results {
            match result {
                Ok(outcome) => report.completed.push((name, outcome)),
                Err(e) => {
                    warn!(app = name.as_str(), "stop failed: {}", e);
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    pub async fn start(&self, target: &Target) -> BatchReport<StartOutcome> {
        match target {
            Target::All => self.start_all().await,
            Target::App(name) => single(name, self.supervisor.start(name).await),
        }
    }

    pub async fn stop(&self, target: &Target) -> BatchReport<StopOutcome> {
        match target {
            Target::All => self.stop_all().await,
            Target::App(name) => single(name, self.supervisor.stop(name).await),
        }
    }

    /// Stop then start `name`, atomically with respect to other commands on it
    pub async fn restart(&self, name: &str) -> Result<StartOutcome> {
        self.supervisor.restart(name).await
    }

    pub async fn status(&self, target: &Target) -> Result<StatusSnapshot> {
        match target {
            Target::All => Ok(self.reporter.snapshot().await),
            Target::App(name) => self.reporter.snapshot_app(name).await,
        }
    }
}

fn single<T>(name: &str, result: Result<T>) -> BatchReport<T> {
    let mut report = BatchReport::default();
    match result {
        Ok(outcome) => report.completed.push((name.to_string(), outcome)),
        Err(e) => report.failed.push((name.to_string(), e)),
    }
    report
}
