// Process module - Core process lifecycle management

pub mod monitor;
pub mod restart;
pub mod spawner;
mod supervisor;
mod types;

pub use restart::{RestartDecision, RestartPolicy};
pub use spawner::{spawn_app, SpawnedProcess};
pub use supervisor::{ProcessSupervisor, StartOutcome, StopOutcome};
pub use types::{ExitInfo, ProcessEntry, ProcessState};
