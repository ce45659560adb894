// Output formatting and display for CLI

use crate::config::SupervisorConfig;
use crate::ipc::{AppResult, ResponseData};
use crate::process::ProcessState;
use crate::status::{EntryStatus, FailureAlert, StatusSnapshot};
use chrono::{DateTime, Local};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a daemon response; failures go to stderr
pub fn print_response(data: &ResponseData, detailed: bool) {
    match data {
        ResponseData::Batch {
            action,
            completed,
            failed,
        } => print_batch(action, completed, failed),

        ResponseData::Status(snapshot) => {
            if detailed {
                for entry in &snapshot.entries {
                    print_detailed_status(entry);
                }
            } else if snapshot.entries.is_empty() {
                println!("{}", "No apps are configured".yellow());
            } else {
                print_status_table(snapshot);
            }
            print_alerts(&snapshot.alerts);
        }

        ResponseData::Success(message) => {
            println!("{} {}", "✓".green().bold(), message);
        }
    }
}

fn print_batch(action: &str, completed: &[AppResult], failed: &[AppResult]) {
    for result in completed {
        println!(
            "{} {}: {}",
            "✓".green().bold(),
            result.name.cyan(),
            result.detail
        );
    }
    for result in failed {
        eprintln!(
            "{} {}: {}",
            "✗".red().bold(),
            result.name.cyan(),
            result.detail
        );
    }

    if completed.len() + failed.len() > 1 {
        let summary = format!(
            "{}: {} ok, {} failed",
            action,
            completed.len(),
            failed.len()
        );
        println!("{}", summary.dimmed().italic());
    }
}

/// Print a formatted table of apps
fn print_status_table(snapshot: &StatusSnapshot) {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
        #[tabled(rename = "Last Exit")]
        last_exit: String,
    }

    let rows: Vec<StatusRow> = snapshot
        .entries
        .iter()
        .map(|e| StatusRow {
            name: truncate(&e.name, 20),
            state: format_state_colored(e),
            pid: e
                .pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "-".to_string()),
            cpu: e
                .cpu_usage
                .map(|cpu| format!("{:.1}%", cpu))
                .unwrap_or_else(|| "-".to_string()),
            memory: e
                .memory_usage
                .map(format_memory)
                .unwrap_or_else(|| "-".to_string()),
            uptime: e
                .uptime
                .map(|d| format_duration(&d))
                .unwrap_or_else(|| "-".to_string()),
            restarts: e.restart_count.to_string(),
            last_exit: format_exit(e.last_exit_code, e.last_exit_signal),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    let taken_at: DateTime<Local> = snapshot.taken_at.into();
    println!("\n{}\n", table);
    println!(
        "{}",
        format!(
            "Total: {} app(s) as of {}",
            snapshot.entries.len(),
            taken_at.format("%H:%M:%S")
        )
        .dimmed()
        .italic()
    );
}

/// Print detailed status view for a single app
fn print_detailed_status(entry: &EntryStatus) {
    println!("\n{}", "App Details".bold().underline());
    println!();
    println!("  {:<15} {}", "Name:".bold(), entry.name.cyan());
    println!("  {:<15} {}", "State:".bold(), format_state_colored(entry));

    if let Some(pid) = entry.pid {
        println!("  {:<15} {}", "PID:".bold(), pid);
    }
    if let Some(cpu) = entry.cpu_usage {
        println!("  {:<15} {:.1}%", "CPU Usage:".bold(), cpu);
    }
    if let Some(memory) = entry.memory_usage {
        println!("  {:<15} {}", "Memory:".bold(), format_memory(memory));
    }
    if let Some(uptime) = entry.uptime {
        println!("  {:<15} {}", "Uptime:".bold(), format_duration(&uptime));
    }
    if let Some(started_at) = entry.started_at {
        let datetime: DateTime<Local> = started_at.into();
        println!(
            "  {:<15} {}",
            "Started At:".bold(),
            datetime.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("  {:<15} {}", "Restarts:".bold(), entry.restart_count);
    println!(
        "  {:<15} {}",
        "Last Exit:".bold(),
        format_exit(entry.last_exit_code, entry.last_exit_signal)
    );
    println!();
}

fn print_alerts(alerts: &[FailureAlert]) {
    for alert in alerts {
        let raised_at: DateTime<Local> = alert.raised_at.into();
        println!(
            "{} {} gave up after {} restarts ({}) at {}",
            "⚠".red().bold(),
            alert.name.cyan(),
            alert.restart_count,
            format_exit(alert.last_exit_code, alert.last_exit_signal),
            raised_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// Print the result of a successful `validate`
pub fn print_config_summary(path: &Path, config: &SupervisorConfig) {
    println!(
        "{} {} is valid: {} app(s)",
        "✓".green().bold(),
        path.display(),
        config.apps.len()
    );
    for app in &config.apps {
        println!(
            "  {} {} {}",
            app.name.cyan(),
            app.command,
            app.args.join(" ").dimmed()
        );
    }
    let policy = &config.policy;
    println!(
        "  {}",
        format!(
            "max_restarts={} backoff={}..{}ms grace={}ms",
            policy.max_restarts,
            policy.backoff_base_ms,
            policy.backoff_max_ms,
            policy.grace_period_ms
        )
        .dimmed()
    );
}

/// Format a state with color coding
fn format_state_colored(entry: &EntryStatus) -> String {
    let label = entry.state.to_string();
    match entry.state {
        ProcessState::Running => label.green().to_string(),
        ProcessState::Starting | ProcessState::Stopping => label.yellow().to_string(),
        ProcessState::Stopped => label.bright_black().to_string(),
        ProcessState::Crashed if entry.budget_exhausted => {
            format!("{} (gave up)", label).red().bold().to_string()
        }
        ProcessState::Crashed => label.red().to_string(),
    }
}

fn format_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("code {}", code),
        (None, Some(signal)) => format!("signal {}", signal),
        (None, None) => "-".to_string(),
    }
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Format memory usage in human-readable format
fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Spinner shown while the daemon works on a slow command
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(&Duration::from_secs(3700)), "1h 1m");
        assert_eq!(format_duration(&Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(512), "512B");
        assert_eq!(format_memory(2048), "2.0KB");
        assert_eq!(format_memory(2 * 1024 * 1024), "2.0MB");
        assert_eq!(format_memory(3 * 1024 * 1024 * 1024), "3.00GB");
    }

    #[test]
    fn test_format_exit() {
        assert_eq!(format_exit(Some(3), None), "code 3");
        assert_eq!(format_exit(None, Some(9)), "signal 9");
        assert_eq!(format_exit(None, None), "-");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
    }
}
