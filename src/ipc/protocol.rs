// IPC Protocol definitions for client-daemon communication

use crate::lifecycle::Target;
use crate::status::StatusSnapshot;
use serde::{Deserialize, Serialize};

/// All available commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Start(Target),
    Stop(Target),
    Restart { name: String },
    Status(Target),
    /// Stop every app and exit the daemon
    Shutdown,
}

/// Per-app result inside a batch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppResult {
    pub name: String,
    /// Human-readable outcome, e.g. "started (pid 4242)"
    pub detail: String,
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    /// Outcome of start/stop/restart over one or more apps
    Batch {
        action: String,
        completed: Vec<AppResult>,
        failed: Vec<AppResult>,
    },
    /// Status snapshot
    Status(StatusSnapshot),
    /// Generic success message
    Success(String),
}

impl ResponseData {
    /// Names of apps the command failed for
    pub fn failed_names(&self) -> Vec<&str> {
        match self {
            ResponseData::Batch { failed, .. } => failed.iter().map(|f| f.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Request message from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}
