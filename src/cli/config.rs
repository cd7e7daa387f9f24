//! `instantly config` handlers.

use std::path::Path;

use anyhow::{bail, Context, Result};

use instantly::config::validate::{validate_config, validate_values, Diagnostic, DiagnosticLevel};
use instantly::config::Config;

use super::ConfigAction;

pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Check => cmd_config_check(&Config::path()),
    }
}

fn cmd_config_check(path: &Path) -> Result<()> {
    println!("Checking {}", path.display());

    let mut diagnostics = check_file(path)?;
    let config = Config::load_from_path(path).context("Config could not be loaded")?;
    diagnostics.extend(validate_values(&config));

    for diag in &diagnostics {
        println!("  {}", diag);
    }

    let count = |level: DiagnosticLevel| diagnostics.iter().filter(|d| d.level == level).count();
    let (errors, warnings) = (count(DiagnosticLevel::Error), count(DiagnosticLevel::Warn));
    if errors > 0 {
        bail!("{} error(s), {} warning(s)", errors, warnings);
    }
    println!("OK ({} warning(s))", warnings);
    Ok(())
}

/// Key-level diagnostics for the raw file; an absent file is not a problem.
fn check_file(path: &Path) -> Result<Vec<Diagnostic>> {
    if !path.exists() {
        println!("  No config file, defaults apply");
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let raw: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{} is not JSON", path.display()))?;
    Ok(validate_config(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_config_check(&dir.path().join("config.json")).is_ok());
    }

    #[test]
    fn test_check_fails_on_zero_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sandbox": {"max_cpu_time": 0}}"#).unwrap();
        let err = cmd_config_check(&path).unwrap_err();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[test]
    fn test_check_rejects_non_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "max_steps = 3").unwrap();
        assert!(check_file(&path).is_err());
    }
}
