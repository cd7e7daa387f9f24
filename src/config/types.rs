//! Configuration type definitions for Instantly
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a config file only needs the fields it changes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sandbox::{
    IsolationMode, ResourceLimits, SandboxConfig, DEFAULT_MAX_CPU_TIME, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MAX_MEMORY,
};

/// Main configuration struct for Instantly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent loop settings
    pub agent: AgentConfig,
    /// Default sandbox for tool calls
    pub sandbox: SandboxSettings,
    /// Built-in tool settings
    pub tools: ToolsConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent
// ============================================================================

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Step ceiling for a run; `None` runs until paused
    pub max_steps: Option<usize>,
    /// Model passed to the LLM provider
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per model reply
    pub max_tokens: u32,
    /// Recent outputs included in each step's prompt
    pub history_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(10),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            history_window: 5,
        }
    }
}

// ============================================================================
// Sandbox
// ============================================================================

/// Default sandbox settings applied to every tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Working directory; unset means the current directory at call time
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env_vars: HashMap<String, String>,
    /// Address-space limit for child processes, bytes
    pub max_memory: u64,
    /// CPU time limit, seconds
    pub max_cpu_time: u64,
    /// Largest file a call may write, bytes
    pub max_file_size: u64,
    /// Isolation mode
    pub mode: IsolationMode,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            working_dir: None,
            env_vars: HashMap::new(),
            max_memory: DEFAULT_MAX_MEMORY,
            max_cpu_time: DEFAULT_MAX_CPU_TIME,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            mode: IsolationMode::default(),
        }
    }
}

impl SandboxSettings {
    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits::new(self.max_memory, self.max_cpu_time, self.max_file_size)
    }

    /// The base [`SandboxConfig`] an agent built from this config uses.
    pub fn to_sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            working_dir: self.working_dir.clone(),
            env_vars: self.env_vars.clone(),
            resource_limits: Some(self.resource_limits()),
            mode: Some(self.mode),
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Built-in tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool names to leave out of the default set
    pub disabled: Vec<String>,
    pub web: WebToolsConfig,
    pub filesystem: FilesystemToolConfig,
    pub api_request: ApiRequestToolConfig,
    pub command: CommandToolConfig,
    pub sqlite: SqliteToolConfig,
}

impl ToolsConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d == name)
    }
}

/// Search and webpage tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebToolsConfig {
    /// Engine behind `web_search`
    pub search_engine: String,
    /// Results returned by `web_search`
    pub search_max_results: usize,
    /// Results returned by `duckduckgo_search`
    pub duckduckgo_max_results: usize,
    /// Truncate fetched pages to this many characters
    pub webpage_max_length: Option<usize>,
}

impl Default for WebToolsConfig {
    fn default() -> Self {
        Self {
            search_engine: "duckduckgo".to_string(),
            search_max_results: 10,
            duckduckgo_max_results: 5,
            webpage_max_length: None,
        }
    }
}

/// `filesystem` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemToolConfig {
    /// Root of all file operations, relative to the sandbox working directory
    pub base_path: String,
}

impl Default for FilesystemToolConfig {
    fn default() -> Self {
        Self {
            base_path: ".".to_string(),
        }
    }
}

/// `api_request` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiRequestToolConfig {
    pub base_url: Option<String>,
    /// Headers sent with every request
    pub headers: HashMap<String, String>,
}

/// `command` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandToolConfig {
    /// Programs the tool may run; empty allows any
    pub allowed_programs: Vec<String>,
}

/// `sqlite` tool (feature `tool-sqlite`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteToolConfig {
    /// Database file; the tool is only registered when set
    pub db_path: Option<String>,
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Optional log file (json format only)
    pub file: Option<String>,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "info".to_string(),
        }
    }
}
