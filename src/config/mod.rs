//! Configuration management for Instantly
//!
//! Configuration is loaded from `~/.instantly/config.json` with environment
//! variable overrides applied on top.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{InstantlyError, Result};

impl Config {
    /// Returns the Instantly configuration directory path (~/.instantly)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".instantly")
    }

    /// Returns the path to the config file (~/.instantly/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                InstantlyError::Config(format!("Invalid config {}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `INSTANTLY_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("INSTANTLY_AGENT_MAX_STEPS") {
            match val.trim().to_ascii_lowercase().as_str() {
                "" | "none" | "unbounded" => self.agent.max_steps = None,
                other => {
                    if let Ok(v) = other.parse() {
                        self.agent.max_steps = Some(v);
                    }
                }
            }
        }
        if let Some(val) = lookup("INSTANTLY_AGENT_MODEL") {
            self.agent.model = val;
        }

        if let Some(val) = lookup("INSTANTLY_SANDBOX_WORKING_DIR") {
            self.sandbox.working_dir = Some(expand_home(&val));
        }
        if let Some(v) = lookup("INSTANTLY_SANDBOX_MAX_MEMORY").and_then(|v| v.parse().ok()) {
            self.sandbox.max_memory = v;
        }
        if let Some(v) = lookup("INSTANTLY_SANDBOX_MAX_CPU_TIME").and_then(|v| v.parse().ok()) {
            self.sandbox.max_cpu_time = v;
        }
        if let Some(v) = lookup("INSTANTLY_SANDBOX_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            self.sandbox.max_file_size = v;
        }
        if let Some(v) = lookup("INSTANTLY_SANDBOX_MODE").and_then(|v| v.parse().ok()) {
            self.sandbox.mode = v;
        }

        if let Some(val) = lookup("INSTANTLY_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Problems that would make the agent misbehave, one line each.
    pub fn validate(&self) -> Vec<String> {
        validate::validate_values(self)
            .into_iter()
            .filter(|d| d.level == validate::DiagnosticLevel::Error)
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect()
    }
}

/// Expand ~ to home directory in a path string
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return match rest.strip_prefix('/') {
                Some(tail) => home.join(tail),
                None if rest.is_empty() => home,
                None => PathBuf::from(path),
            };
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::IsolationMode;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.max_steps, Some(10));
        assert_eq!(config.sandbox.max_cpu_time, 30);
        assert_eq!(config.sandbox.mode, IsolationMode::Scoped);
        assert_eq!(config.tools.web.search_engine, "duckduckgo");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"sandbox": {"max_cpu_time": 5, "mode": "process_global"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.sandbox.max_cpu_time, 5);
        assert_eq!(config.sandbox.mode, IsolationMode::ProcessGlobal);
        assert_eq!(config.sandbox.max_memory, 512 * 1024 * 1024);
        assert_eq!(config.agent.model, AgentConfig::default().model);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            ("INSTANTLY_AGENT_MAX_STEPS", "3"),
            ("INSTANTLY_AGENT_MODEL", "test-model"),
            ("INSTANTLY_SANDBOX_WORKING_DIR", "/srv/work"),
            ("INSTANTLY_SANDBOX_MAX_CPU_TIME", "7"),
            ("INSTANTLY_SANDBOX_MAX_MEMORY", "1024"),
            ("INSTANTLY_SANDBOX_MAX_FILE_SIZE", "2048"),
            ("INSTANTLY_SANDBOX_MODE", "process_global"),
            ("INSTANTLY_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.agent.max_steps, Some(3));
        assert_eq!(config.agent.model, "test-model");
        assert_eq!(config.sandbox.working_dir, Some(PathBuf::from("/srv/work")));
        assert_eq!(config.sandbox.max_cpu_time, 7);
        assert_eq!(config.sandbox.max_memory, 1024);
        assert_eq!(config.sandbox.max_file_size, 2048);
        assert_eq!(config.sandbox.mode, IsolationMode::ProcessGlobal);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            ("INSTANTLY_SANDBOX_MAX_CPU_TIME", "soon"),
            ("INSTANTLY_SANDBOX_MODE", "chroot"),
        ]));
        assert_eq!(config.sandbox.max_cpu_time, 30);
        assert_eq!(config.sandbox.mode, IsolationMode::Scoped);
    }

    #[test]
    fn test_unbounded_steps_override() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[("INSTANTLY_AGENT_MAX_STEPS", "none")]));
        assert_eq!(config.agent.max_steps, None);
    }

    #[test]
    fn test_to_sandbox_config() {
        let mut settings = SandboxSettings::default();
        settings.env_vars.insert("A".into(), "1".into());
        settings.max_file_size = 10;
        let sandbox = settings.to_sandbox_config();
        assert_eq!(sandbox.env_vars["A"], "1");
        assert_eq!(sandbox.resource_limits.unwrap().max_file_size, 10);
        assert_eq!(sandbox.mode, Some(IsolationMode::Scoped));
        assert!(sandbox.working_dir.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.agent.model = "saved-model".to_string();
        config.tools.disabled = vec!["command".into()];
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.tools.disabled, vec!["command"]);
        assert!(!loaded.tools.is_enabled("command"));
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(InstantlyError::Config(_))
        ));
    }

    #[test]
    fn test_load_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(config.sandbox.max_file_size, 50 * 1024 * 1024);
    }

    #[test]
    fn test_validate_reports_errors_only() {
        let mut config = Config::default();
        config.agent.max_steps = Some(0);
        assert!(config.validate().is_empty());

        config.sandbox.max_memory = 0;
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("sandbox.max_memory"));
    }

    #[test]
    fn test_config_dir_and_path() {
        assert!(Config::dir().ends_with(".instantly"));
        assert!(Config::path().ends_with(".instantly/config.json"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs"), PathBuf::from("/abs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/work"), home.join("work"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
