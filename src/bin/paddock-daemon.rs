use anyhow::Context;
use clap::Parser;
use paddock::config::SupervisorConfig;
use paddock::daemon::{Daemon, DaemonOptions, DEFAULT_PID_FILE};
use paddock::ipc::DEFAULT_SOCKET_PATH;
use paddock::logging::{init_logging, LogLevel};
use std::path::PathBuf;

/// Paddock daemon - runs and supervises the apps from a config file
#[derive(Parser)]
#[command(name = "paddock-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a .toml or .json config file
    #[arg(short, long)]
    config: PathBuf,

    /// Control socket path
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// PID file path
    #[arg(long, default_value = DEFAULT_PID_FILE)]
    pid_file: PathBuf,

    /// Do not start apps on boot
    #[arg(long)]
    no_autostart: bool,

    /// Log level (overrides PADDOCK_LOG)
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level)?;

    let config = SupervisorConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let options = DaemonOptions {
        socket_path: args.socket,
        pid_file: args.pid_file,
        autostart: !args.no_autostart,
    };

    Daemon::new(config, options)
        .run()
        .await
        .context("Daemon exited with an error")?;

    Ok(())
}
