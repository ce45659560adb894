use crate::config::AppDescriptor;
use crate::error::{Result, SupervisorError};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Metadata returned when spawning a process
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS; also the child's process group ID
    pub pid: u32,
}

/// Spawn the child described by `descriptor`
///
/// The child gets:
/// - the descriptor's working directory, command and arguments
/// - the supervisor's environment with the descriptor's overrides applied
/// - its own process group, so stop signals reach its descendants too
/// - stdout/stderr forwarded line by line to the log
pub fn spawn_app(descriptor: &AppDescriptor) -> Result<SpawnedProcess> {
    if !descriptor.cwd.is_dir() {
        return Err(SupervisorError::spawn(
            &descriptor.name,
            format!(
                "working directory does not exist: {}",
                descriptor.cwd.display()
            ),
        ));
    }

    let mut std_command = std::process::Command::new(&descriptor.command);
    std_command
        .args(&descriptor.args)
        .current_dir(&descriptor.cwd)
        .envs(&descriptor.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }

    let mut command = Command::from(std_command);
    command.kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| SupervisorError::spawn(&descriptor.name, e.to_string()))?;

    let pid = child.id().ok_or_else(|| {
        SupervisorError::spawn(&descriptor.name, "child exited before reporting a pid")
    })?;

    if let Some(stdout) = child.stdout.take() {
        forward_output(descriptor.name.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(descriptor.name.clone(), "stderr", stderr);
    }

    Ok(SpawnedProcess { child, pid })
}

fn forward_output<R>(app: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::info!(target: "paddock::app", app = %app, stream, "{}", line)
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(app = %app, stream, "output stream closed: {}", e);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn descriptor(name: &str, command: &str, args: &[&str]) -> AppDescriptor {
        AppDescriptor {
            name: name.to_string(),
            cwd: PathBuf::from("/"),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            stop_signal: "SIGTERM".to_string(),
        }
    }

    #[tokio::test]
    async fn test_spawn_simple_process() {
        let spawned = spawn_app(&descriptor("echo", "/bin/echo", &["hello"])).unwrap();
        assert!(spawned.pid > 0);
    }

    #[tokio::test]
    async fn test_spawn_uses_working_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut d = descriptor("pwd", "/bin/sh", &["-c", "test \"$(pwd -P)\" = \"$EXPECTED\""]);
        d.cwd = temp_dir.path().to_path_buf();
        d.env.insert(
            "EXPECTED".to_string(),
            temp_dir
                .path()
                .canonicalize()
                .unwrap()
                .to_string_lossy()
                .to_string(),
        );

        let mut spawned = spawn_app(&d).unwrap();
        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_merges_env_overrides() {
        std::env::set_var("PADDOCK_SPAWN_INHERITED", "from-parent");
        let mut d = descriptor(
            "env",
            "/bin/sh",
            &[
                "-c",
                "test \"$PADDOCK_SPAWN_INHERITED\" = from-parent && test \"$OVERRIDE\" = yes",
            ],
        );
        d.env.insert("OVERRIDE".to_string(), "yes".to_string());

        let mut spawned = spawn_app(&d).unwrap();
        assert!(spawned.child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result = spawn_app(&descriptor("ghost", "/nonexistent/binary", &[]));
        match result {
            Err(SupervisorError::Spawn { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("Expected Spawn error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let mut d = descriptor("lost", "/bin/echo", &[]);
        d.cwd = PathBuf::from("/nonexistent/directory");

        match spawn_app(&d) {
            Err(SupervisorError::Spawn { reason, .. }) => {
                assert!(reason.contains("working directory"))
            }
            other => panic!("Expected Spawn error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_in_own_process_group() {
        let mut spawned = spawn_app(&descriptor("group", "/bin/sleep", &["5"])).unwrap();
        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(spawned.pid as i32)))
            .unwrap();
        assert_eq!(pgid.as_raw(), spawned.pid as i32);

        spawned.child.kill().await.unwrap();
    }
}
