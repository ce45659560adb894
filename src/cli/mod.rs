// CLI module - User-facing command-line interface

mod output;

use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::ipc::{Command, IpcClient, ResponseData, DEFAULT_SOCKET_PATH};
use crate::lifecycle::Target;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Paddock - supervise a fixed set of long-running apps
#[derive(Parser)]
#[command(name = "paddock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the daemon's control socket
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one app, or every app with --all
    Start(TargetArgs),

    /// Stop one app, or every app with --all
    Stop(TargetArgs),

    /// Show the process table (all apps unless a name is given)
    Status(TargetArgs),

    /// Stop then start a single app
    Restart {
        /// App name
        name: String,
    },

    /// Stop every app and exit the daemon
    Shutdown,

    /// Check a config file without contacting the daemon
    Validate {
        /// Path to a .toml or .json config file
        file: PathBuf,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// App name
    #[arg(conflicts_with = "all")]
    name: Option<String>,

    /// Apply to every app
    #[arg(long)]
    all: bool,
}

impl TargetArgs {
    fn target(&self, default_all: bool) -> Result<Target> {
        match (&self.name, self.all) {
            (Some(name), false) => Ok(Target::App(name.clone())),
            (None, true) => Ok(Target::All),
            (None, false) if default_all => Ok(Target::All),
            _ => Err(SupervisorError::Other(
                "Specify an app name or --all".to_string(),
            )),
        }
    }
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Execute the parsed command
    fn execute(&self) -> Result<()> {
        if let Commands::Validate { file } = &self.command {
            let config = SupervisorConfig::from_file(file)?;
            output::print_config_summary(file, &config);
            return Ok(());
        }

        let command = self.build_command()?;
        let detailed = matches!(command, Command::Status(Target::App(_)));
        let spinner = match &command {
            Command::Stop(target) => Some(output::create_progress_bar(&format!(
                "Stopping {}...",
                target
            ))),
            Command::Restart { name } => {
                Some(output::create_progress_bar(&format!("Restarting {}...", name)))
            }
            _ => None,
        };

        let client = IpcClient::with_socket_path(&self.socket);
        let response = client.send_command(command);
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        match response?.result {
            Ok(data) => {
                output::print_response(&data, detailed);
                check_failures(&data)
            }
            Err(error_msg) => Err(SupervisorError::Other(error_msg)),
        }
    }

    /// Build an IPC command from the CLI arguments
    fn build_command(&self) -> Result<Command> {
        match &self.command {
            Commands::Start(args) => Ok(Command::Start(args.target(false)?)),
            Commands::Stop(args) => Ok(Command::Stop(args.target(false)?)),
            Commands::Status(args) => Ok(Command::Status(args.target(true)?)),
            Commands::Restart { name } => Ok(Command::Restart { name: name.clone() }),
            Commands::Shutdown => Ok(Command::Shutdown),
            Commands::Validate { .. } => Err(SupervisorError::Other(
                "validate is handled locally".to_string(),
            )),
        }
    }
}

/// Turn per-app failures inside a successful response into an error
fn check_failures(data: &ResponseData) -> Result<()> {
    match data {
        ResponseData::Batch { failed, .. } if !failed.is_empty() => Err(SupervisorError::Aggregate(
            failed
                .iter()
                .map(|f| (f.name.clone(), f.detail.clone()))
                .collect(),
        )),
        _ => Ok(()),
    }
}
