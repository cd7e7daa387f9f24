//! Sandbox value types: limits, per-call configuration and execution context

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InstantlyError, Result};

/// Default address-space ceiling (512 MiB).
pub const DEFAULT_MAX_MEMORY: u64 = 512 * 1024 * 1024;
/// Default CPU time ceiling in seconds.
pub const DEFAULT_MAX_CPU_TIME: u64 = 30;
/// Default largest file a sandboxed call may write (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Resource ceilings applied to one sandboxed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Address-space limit in bytes (child processes only)
    pub max_memory: u64,
    /// CPU time limit in seconds; also the wall-clock deadline of the call
    pub max_cpu_time: u64,
    /// Largest file, in bytes, a call may write
    pub max_file_size: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
            max_cpu_time: DEFAULT_MAX_CPU_TIME,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ResourceLimits {
    pub fn new(max_memory: u64, max_cpu_time: u64, max_file_size: u64) -> Self {
        Self {
            max_memory,
            max_cpu_time,
            max_file_size,
        }
    }

    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = bytes;
        self
    }

    pub fn with_max_cpu_time(mut self, secs: u64) -> Self {
        self.max_cpu_time = secs;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }
}

/// How a sandboxed call is isolated from the rest of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// The call receives an explicit [`SandboxContext`]; process cwd and
    /// environment are never touched. Concurrent calls are safe.
    #[default]
    Scoped,
    /// The process cwd and environment are switched for the duration of the
    /// call and restored afterwards. Calls are serialised by a global lock.
    ProcessGlobal,
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scoped => write!(f, "scoped"),
            Self::ProcessGlobal => write!(f, "process_global"),
        }
    }
}

impl std::str::FromStr for IsolationMode {
    type Err = InstantlyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scoped" => Ok(Self::Scoped),
            "process_global" | "process-global" | "global" => Ok(Self::ProcessGlobal),
            other => Err(InstantlyError::Config(format!(
                "Unknown sandbox mode '{}' (expected 'scoped' or 'process_global')",
                other
            ))),
        }
    }
}

/// Requested isolation for a sandboxed call. Every field is optional so
/// configs can be layered with [`SandboxConfig::merge`].
///
/// # Example
/// ```
/// use instantly::sandbox::{SandboxConfig, ResourceLimits};
///
/// let base = SandboxConfig::new()
///     .with_working_dir("/tmp")
///     .with_env("MODE", "base");
/// let overrides = SandboxConfig::new().with_env("MODE", "call");
///
/// let merged = base.merge(&overrides);
/// assert_eq!(merged.env_vars["MODE"], "call");
/// assert_eq!(merged.working_dir.as_deref(), Some(std::path::Path::new("/tmp")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Working directory for the call (default: current dir at call time)
    pub working_dir: Option<PathBuf>,
    /// Environment variables layered over the process environment
    pub env_vars: HashMap<String, String>,
    /// Ceilings (default: [`ResourceLimits::default`])
    pub resource_limits: Option<ResourceLimits>,
    /// Isolation mode (default: [`IsolationMode::Scoped`])
    pub mode: Option<IsolationMode>,
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = Some(limits);
        self
    }

    pub fn with_mode(mut self, mode: IsolationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Layers `overrides` on top of `self`.
    ///
    /// Fields set in `overrides` win; environment maps are merged key by key
    /// with the override's value taking precedence.
    pub fn merge(&self, overrides: &SandboxConfig) -> SandboxConfig {
        let mut env_vars = self.env_vars.clone();
        env_vars.extend(
            overrides
                .env_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        SandboxConfig {
            working_dir: overrides
                .working_dir
                .clone()
                .or_else(|| self.working_dir.clone()),
            env_vars,
            resource_limits: overrides.resource_limits.or(self.resource_limits),
            mode: overrides.mode.or(self.mode),
        }
    }

    /// Effective isolation mode.
    pub fn isolation_mode(&self) -> IsolationMode {
        self.mode.unwrap_or_default()
    }
}

/// Resolved execution context handed to a sandboxed callable.
///
/// Tools resolve relative paths, look up environment variables and spawn
/// child processes through the context instead of the process globals.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxContext {
    /// Absolute working directory of the call
    pub working_dir: PathBuf,
    /// Environment overrides for the call
    pub env_vars: HashMap<String, String>,
    /// Ceilings for the call
    pub resource_limits: ResourceLimits,
}

impl SandboxContext {
    /// Context rooted at `working_dir` with no overrides and default limits.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env_vars: HashMap::new(),
            resource_limits: ResourceLimits::default(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    /// Builds the context for `config`, validating it first.
    ///
    /// # Errors
    /// `Config` when the working directory does not exist or an environment
    /// key or value cannot be set.
    ///
    /// Relative and default working directories are resolved against the
    /// host directory, never against the cwd of a process-global run that
    /// happens to be in progress.
    pub fn resolve(config: &SandboxConfig) -> Result<Self> {
        let cwd = super::process::host_dir()?;
        let working_dir = match &config.working_dir {
            Some(dir) => {
                let dir = if dir.is_absolute() {
                    dir.clone()
                } else {
                    cwd.join(dir)
                };
                if !dir.is_dir() {
                    return Err(InstantlyError::Config(format!(
                        "Sandbox working directory does not exist: {}",
                        dir.display()
                    )));
                }
                dir
            }
            None => cwd,
        };

        for (key, value) in &config.env_vars {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(InstantlyError::Config(format!(
                    "Invalid environment variable name: {:?}",
                    key
                )));
            }
            if value.contains('\0') {
                return Err(InstantlyError::Config(format!(
                    "Environment variable {} contains a NUL byte",
                    key
                )));
            }
        }

        Ok(Self {
            working_dir,
            env_vars: config.env_vars.clone(),
            resource_limits: config.resource_limits.unwrap_or_default(),
        })
    }

    /// Resolves `path` against the working directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Looks up `key`, preferring the call's overrides over the host environment.
    pub fn env(&self, key: &str) -> Option<String> {
        self.env_vars
            .get(key)
            .cloned()
            .or_else(|| super::process::host_var(key))
    }

    /// The full environment a child process would see.
    pub fn effective_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = super::process::host_vars().into_iter().collect();
        env.extend(
            self.env_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    /// A child-process command configured for this context.
    ///
    /// The command starts in the working directory, sees the environment
    /// overrides, and runs under the context's OS resource limits.
    pub fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(program);
        cmd.current_dir(&self.working_dir);
        cmd.env_clear();
        cmd.envs(super::process::host_vars_os());
        cmd.envs(&self.env_vars);
        cmd.kill_on_drop(true);
        super::limits::apply_child_limits(&mut cmd, &self.resource_limits);
        cmd
    }
}
