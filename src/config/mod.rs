use crate::error::{Result, SupervisorError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Signals accepted as a graceful stop signal
pub const STOP_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGHUP", "SIGUSR1", "SIGUSR2", "SIGKILL",
];

/// Static definition of one supervised application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Unique identifier of the app
    pub name: String,

    /// Working directory the command is launched in
    pub cwd: PathBuf,

    /// Executable name or path
    pub command: String,

    /// Ordered command-line arguments
    pub args: Vec<String>,

    /// Environment overrides merged onto the supervisor's environment
    pub env: HashMap<String, String>,

    /// Signal sent on a graceful stop
    pub stop_signal: String,
}

/// Restart, backoff and shutdown parameters shared by all apps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorPolicy {
    /// Consecutive automatic restarts allowed before an app is left crashed
    pub max_restarts: u32,

    /// Delay before the first automatic restart, doubled per consecutive crash
    pub backoff_base_ms: u64,

    /// Upper bound for the restart delay
    pub backoff_max_ms: u64,

    /// Time a process gets to exit after the stop signal before SIGKILL
    pub grace_period_ms: u64,

    /// A run at least this long resets the consecutive crash counter
    #[serde(default)]
    pub min_uptime_ms: Option<u64>,
}

impl SupervisorPolicy {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn min_uptime(&self) -> Option<Duration> {
        self.min_uptime_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(SupervisorError::validation(
                "[policy]",
                "backoff_base_ms",
                format!(
                    "must not exceed backoff_max_ms ({} > {})",
                    self.backoff_base_ms, self.backoff_max_ms
                ),
            ));
        }
        Ok(())
    }
}

/// A validated configuration: the policy plus descriptors in file order
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub policy: SupervisorPolicy,
    pub apps: Vec<AppDescriptor>,
}

/// `args` may be written as a list or as one whitespace-separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawArgs {
    List(Vec<String>),
    Line(String),
}

impl RawArgs {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawArgs::List(args) => args,
            RawArgs::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// App entry as written in the file, before validation
#[derive(Debug, Clone, Deserialize)]
struct RawApp {
    #[serde(default)]
    name: String,
    #[serde(default)]
    cwd: String,
    #[serde(default, alias = "script")]
    command: String,
    #[serde(default)]
    args: Option<RawArgs>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default = "default_stop_signal")]
    stop_signal: String,
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    policy: SupervisorPolicy,
    #[serde(default)]
    apps: Vec<RawApp>,
}

impl SupervisorConfig {
    /// Load and validate a configuration file (TOML or JSON, by extension)
    pub fn from_file(path: &Path) -> Result<SupervisorConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let raw = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(SupervisorError::Config(format!(
                    "Unsupported file format: '{}'. Use .toml or .json",
                    extension
                )))
            }
        };

        Self::from_raw(raw)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(contents: &str) -> Result<SupervisorConfig> {
        Self::from_raw(Self::parse_toml(contents)?)
    }

    /// Parse and validate JSON text
    pub fn from_json_str(contents: &str) -> Result<SupervisorConfig> {
        Self::from_raw(Self::parse_json(contents)?)
    }

    fn parse_toml(contents: &str) -> Result<RawConfig> {
        toml::from_str(contents)
            .map_err(|e| SupervisorError::Config(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<RawConfig> {
        serde_json::from_str(contents)
            .map_err(|e| SupervisorError::Config(format!("Failed to parse JSON: {}", e)))
    }

    fn from_raw(raw: RawConfig) -> Result<SupervisorConfig> {
        let mut errors = Vec::new();

        if let Err(e) = raw.policy.validate() {
            errors.push(e);
        }

        if raw.apps.is_empty() {
            errors.push(SupervisorError::validation(
                "list",
                "apps",
                "must contain at least one app",
            ));
        }

        let mut seen = HashSet::new();
        let mut apps = Vec::with_capacity(raw.apps.len());

        for (index, app) in raw.apps.into_iter().enumerate() {
            let label = if app.name.is_empty() {
                format!("#{}", index)
            } else {
                format!("#{} ('{}')", index, app.name)
            };

            let mut entry_ok = true;
            let mut reject = |field: &str, reason: String| {
                errors.push(SupervisorError::validation(label.clone(), field, reason));
                entry_ok = false;
            };

            if app.name.trim().is_empty() {
                reject("name", "must not be empty".to_string());
            } else if !seen.insert(app.name.clone()) {
                reject("name", format!("duplicates an earlier app named '{}'", app.name));
            }
            if app.cwd.trim().is_empty() {
                reject("cwd", "must not be empty".to_string());
            }
            if app.command.trim().is_empty() {
                reject("command", "must not be empty".to_string());
            }
            if !STOP_SIGNALS.contains(&app.stop_signal.as_str()) {
                reject(
                    "stop_signal",
                    format!(
                        "'{}' is not one of: {}",
                        app.stop_signal,
                        STOP_SIGNALS.join(", ")
                    ),
                );
            }

            if entry_ok {
                apps.push(AppDescriptor::from_raw(app));
            }
        }

        if !errors.is_empty() {
            return Err(SupervisorError::InvalidDescriptors(errors));
        }

        Ok(SupervisorConfig {
            policy: raw.policy,
            apps,
        })
    }
}

impl AppDescriptor {
    fn from_raw(raw: RawApp) -> Self {
        let args = raw.args.map(RawArgs::into_vec).unwrap_or_default();

        AppDescriptor {
            name: raw.name,
            cwd: PathBuf::from(expand_env_in_string(&raw.cwd)),
            command: raw.command,
            args: args.iter().map(|a| expand_env_in_string(a)).collect(),
            env: raw
                .env
                .into_iter()
                .map(|(k, v)| {
                    let v = expand_env_in_string(&v);
                    (k, v)
                })
                .collect(),
            stop_signal: raw.stop_signal,
        }
    }
}

/// Expand `$VAR` and `${VAR}` references from the current environment.
/// Unknown variables are left as written.
fn expand_env_in_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (var, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match (var.is_empty(), std::env::var(var)) {
            (false, Ok(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
