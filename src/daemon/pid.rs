// PID file guarding against a second daemon instance

use crate::error::{Result, SupervisorError};
use std::fs;
use std::path::{Path, PathBuf};

/// Default PID file location
pub const DEFAULT_PID_FILE: &str = "/tmp/paddock.pid";

/// Manages the daemon PID file
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a new PID file manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Claim the PID file for this process.
    ///
    /// Fails with `DaemonAlreadyRunning` when the recorded pid is alive;
    /// a stale file left by a dead daemon is overwritten.
    pub fn acquire(&self) -> Result<()> {
        if let Some(pid) = self.running_pid() {
            if pid != std::process::id() {
                return Err(SupervisorError::DaemonAlreadyRunning(pid));
            }
        }
        self.write()
    }

    /// Write the current process PID to the file
    pub fn write(&self) -> Result<()> {
        let pid = std::process::id();
        fs::write(&self.path, pid.to_string())
            .map_err(|e| SupervisorError::Other(format!("Failed to write PID file: {}", e)))?;
        Ok(())
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| SupervisorError::Other(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| SupervisorError::Other(format!("Invalid PID in file: {}", e)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the PID file
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| SupervisorError::Other(format!("Failed to remove PID file: {}", e)))?;
        }
        Ok(())
    }

    /// Pid recorded in the file, if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        if !self.exists() {
            return None;
        }
        self.read().ok().filter(|pid| is_process_alive(*pid))
    }

    pub fn is_daemon_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Get the path to the PID file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Probe with signal 0
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_pid() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("paddock.pid"));

        pid_file.write().unwrap();
        assert_eq!(pid_file.read().unwrap(), std::process::id());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("paddock.pid"));

        pid_file.write().unwrap();
        assert!(pid_file.exists());

        pid_file.remove().unwrap();
        assert!(!pid_file.exists());
        // Removing twice is fine
        pid_file.remove().unwrap();
    }

    #[test]
    fn test_is_daemon_running_current_process() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("paddock.pid"));

        pid_file.write().unwrap();
        assert!(pid_file.is_daemon_running());
    }

    #[test]
    fn test_acquire_rejects_live_daemon() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paddock.pid");
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(&path, child.id().to_string()).unwrap();

        let result = PidFile::with_path(&path).acquire();
        let _ = child.kill();
        let _ = child.wait();

        match result {
            Err(SupervisorError::DaemonAlreadyRunning(pid)) => assert_eq!(pid, child.id()),
            other => panic!("Expected DaemonAlreadyRunning, got {:?}", other),
        }
    }

    #[test]
    fn test_acquire_overwrites_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paddock.pid");
        fs::write(&path, "not-a-pid").unwrap();

        let pid_file = PidFile::with_path(&path);
        pid_file.acquire().unwrap();
        assert_eq!(pid_file.read().unwrap(), std::process::id());
    }
}
