use std::time::Duration;
use thiserror::Error;

/// Main error type for the paddock supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    // Descriptor loading
    #[error("Invalid app {entry}: field '{field}' {reason}")]
    Validation {
        /// Index and, when known, name of the offending entry
        entry: String,
        field: String,
        reason: String,
    },

    #[error("Configuration validation failed:\n{}", bullet_list(.0))]
    InvalidDescriptors(Vec<SupervisorError>),

    #[error("Configuration error: {0}")]
    Config(String),

    // Process lifecycle
    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Failed to spawn '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("App '{name}' did not exit within {grace:?}, force-killing")]
    GracefulStopTimeout { name: String, grace: Duration },

    #[error("App '{name}' exhausted its restart budget after {restarts} restarts")]
    RestartBudgetExhausted { name: String, restarts: u32 },

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("{} app(s) failed: {}", .0.len(), failed_names(.0))]
    Aggregate(Vec<(String, String)>),

    // IPC
    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Failed to connect to daemon: {0}")]
    Connection(String),

    #[error("IPC protocol error: {0}")]
    Protocol(String),

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Daemon already running (pid {0})")]
    DaemonAlreadyRunning(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("{0}")]
    Other(String),
}

impl SupervisorError {
    pub(crate) fn validation(
        entry: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SupervisorError::Validation {
            entry: entry.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn spawn(name: impl Into<String>, reason: impl Into<String>) -> Self {
        SupervisorError::Spawn {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

fn bullet_list(errors: &[SupervisorError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

fn failed_names(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
