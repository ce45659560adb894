// Daemon - owns the supervisor and serves client commands until shutdown

pub mod pid;

pub use pid::{PidFile, DEFAULT_PID_FILE};

use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::ipc::{AppResult, Command, IpcServer, Response, ResponseData, DEFAULT_SOCKET_PATH};
use crate::lifecycle::{BatchReport, LifecycleController};
use crate::process::ProcessSupervisor;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Runtime options for the daemon
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub socket_path: PathBuf,
    pub pid_file: PathBuf,
    /// Start every app once the daemon is up
    pub autostart: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            autostart: true,
        }
    }
}

pub struct Daemon {
    controller: Arc<LifecycleController>,
    options: DaemonOptions,
}

impl Daemon {
    pub fn new(config: SupervisorConfig, options: DaemonOptions) -> Self {
        let supervisor = ProcessSupervisor::new(config);
        Self {
            controller: Arc::new(LifecycleController::new(supervisor)),
            options,
        }
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Run until SIGTERM, SIGINT or a `Shutdown` request
    pub async fn run(self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        self.run_until(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        })
        .await
    }

    /// Run until `external` resolves or a `Shutdown` request arrives,
    /// then stop every app and release the socket and PID file
    pub async fn run_until<F>(self, external: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let pid_file = PidFile::with_path(&self.options.pid_file);
        pid_file.acquire()?;

        let mut server = IpcServer::with_socket_path(&self.options.socket_path);
        if let Err(e) = server.start() {
            let _ = pid_file.remove();
            return Err(e);
        }

        info!(
            pid = std::process::id(),
            socket = %self.options.socket_path.display(),
            apps = self.controller.supervisor().names().len(),
            "Daemon started"
        );

        if self.options.autostart {
            let report = self.controller.start_all().await;
            if !report.is_success() {
                warn!(failed = ?report.failed_names(), "Some apps failed to start");
            }
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let controller = Arc::clone(&self.controller);
        let handler = move |command: Command| {
            let controller = Arc::clone(&controller);
            let shutdown_tx = shutdown_tx.clone();
            async move { handle_command(&controller, command, &shutdown_tx).await }
        };

        let stop = async move {
            tokio::select! {
                _ = external => {}
                _ = shutdown_rx.recv() => info!("Shutdown requested by client"),
            }
        };

        let served = server.run(handler, stop).await;
        if let Err(e) = &served {
            error!("IPC server error: {}", e);
        }
        if let Err(e) = server.stop() {
            warn!("Failed to remove socket: {}", e);
        }

        info!("Stopping all apps");
        let report = self.controller.stop_all().await;
        if !report.is_success() {
            warn!(failed = ?report.failed_names(), "Some apps failed to stop");
        }

        pid_file.remove()?;
        info!("Daemon stopped");
        served
    }
}

/// Execute one client command against the controller
pub async fn handle_command(
    controller: &LifecycleController,
    command: Command,
    shutdown: &mpsc::Sender<()>,
) -> Result<Response> {
    let data = match command {
        Command::Start(target) => batch_response("start", controller.start(&target).await),
        Command::Stop(target) => batch_response("stop", controller.stop(&target).await),
        Command::Restart { name } => {
            let mut report = BatchReport::default();
            match controller.restart(&name).await {
                Ok(outcome) => report.completed.push((name, outcome)),
                Err(e) => report.failed.push((name, e)),
            }
            batch_response("restart", report)
        }
        Command::Status(target) => ResponseData::Status(controller.status(&target).await?),
        Command::Shutdown => {
            // Capacity 1: a second request while one is pending is a no-op
            let _ = shutdown.try_send(());
            ResponseData::Success("Daemon shutting down".to_string())
        }
    };

    Ok(Response::success(0, data))
}

fn batch_response<T: Display>(action: &str, report: BatchReport<T>) -> ResponseData {
    ResponseData::Batch {
        action: action.to_string(),
        completed: report
            .completed
            .into_iter()
            .map(|(name, outcome)| AppResult {
                name,
                detail: outcome.to_string(),
            })
            .collect(),
        failed: report
            .failed
            .into_iter()
            .map(|(name, e)| AppResult {
                name,
                detail: e.to_string(),
            })
            .collect(),
    }
}
