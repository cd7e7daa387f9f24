//! Command tool for Instantly
//!
//! Runs a program as a child process of the sandbox. The child starts in the
//! sandbox working directory, sees its environment overrides, and runs under
//! the OS resource limits of the call. No shell is involved: arguments are
//! passed to the program verbatim.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

use super::{Tool, ToolArgs, ToolMetadata};

/// Tool for running a program with arguments.
///
/// # Parameters
/// - `program`: executable name or path (required)
/// - `args`: array of string arguments (optional)
///
/// Returns `{"exit_code", "stdout", "stderr"}`.
///
/// # Example
/// ```rust
/// use instantly::sandbox::SandboxContext;
/// use instantly::tools::{Tool, ToolArgs};
/// use instantly::tools::shell::CommandTool;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = CommandTool::new();
/// let ctx = SandboxContext::new(std::env::temp_dir());
/// let args = ToolArgs::from_args(vec![json!("echo"), json!(["hello"])]);
/// let result = tool.invoke(args, &ctx).await.unwrap();
/// assert_eq!(result["stdout"].as_str().unwrap().trim(), "hello");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandTool {
    allowed_programs: Vec<String>,
}

impl CommandTool {
    /// A command tool that may run any program.
    pub fn new() -> Self {
        Self::default()
    }

    /// A command tool restricted to `allowed` program names. Empty means no restriction.
    pub fn with_allowed_programs(allowed: Vec<String>) -> Self {
        Self {
            allowed_programs: allowed,
        }
    }

    fn check_allowed(&self, program: &str) -> Result<()> {
        if self.allowed_programs.is_empty() || self.allowed_programs.iter().any(|p| p == program) {
            Ok(())
        } else {
            Err(InstantlyError::Validation(format!(
                "Program '{}' is not in the allowed list",
                program
            )))
        }
    }
}

fn string_list(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(InstantlyError::Validation(format!(
                    "Command arguments must be strings, got {}",
                    other
                ))),
            })
            .collect(),
        Some(other) => Err(InstantlyError::Validation(format!(
            "Argument 'args' must be an array, got {}",
            other
        ))),
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("command", "Run a program inside the sandbox")
            .with_tags(["process", "system"])
            .asynchronous()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "program": {"type": "string", "description": "Program to run"},
                "args": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["program"]
        })
    }

    async fn invoke(&self, args: ToolArgs, ctx: &SandboxContext) -> Result<Value> {
        let program = args.str_arg(0, "program")?;
        let argv = string_list(args.get(1, "args"))?;
        self.check_allowed(&program)?;

        debug!(program = %program, args = argv.len(), "Spawning sandboxed command");
        let output = ctx
            .command(&program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                InstantlyError::Execution(format!("Failed to run '{}': {}", program, e))
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(limit) = output
                .status
                .signal()
                .and_then(crate::sandbox::limit_for_signal)
            {
                return Err(InstantlyError::ResourceLimit(format!(
                    "'{}' exceeded its {} limit",
                    program, limit
                )));
            }
        }

        Ok(json!({
            "exit_code": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::sandbox::ResourceLimits;

    fn run(program: &str, argv: &[&str]) -> ToolArgs {
        ToolArgs::from_args(vec![json!(program), json!(argv)])
    }

    #[tokio::test]
    async fn test_exit_code_and_streams() {
        let ctx = SandboxContext::new(std::env::temp_dir());
        let result = CommandTool::new()
            .invoke(run("sh", &["-c", "echo out; echo err >&2; exit 3"]), &ctx)
            .await
            .unwrap();
        assert_eq!(result["exit_code"], json!(3));
        assert_eq!(result["stdout"], json!("out\n"));
        assert_eq!(result["stderr"], json!("err\n"));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir_with_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let ctx = SandboxContext::new(dir.path()).with_env("TOOL_ENV", "42");

        let result = CommandTool::new()
            .invoke(run("sh", &["-c", "ls; echo $TOOL_ENV"]), &ctx)
            .await
            .unwrap();
        let stdout = result["stdout"].as_str().unwrap();
        assert!(stdout.contains("marker.txt"));
        assert!(stdout.contains("42"));
    }

    #[tokio::test]
    async fn test_file_size_limit_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SandboxContext::new(dir.path())
            .with_limits(ResourceLimits::default().with_max_file_size(1024));

        let err = CommandTool::new()
            .invoke(
                run("sh", &["-c", "head -c 100000 /dev/zero > big.bin"]),
                &ctx,
            )
            .await;
        // The shell may report the failed write itself instead of dying from SIGXFSZ
        match err {
            Err(InstantlyError::ResourceLimit(_)) => {}
            Ok(result) => assert_ne!(result["exit_code"], json!(0)),
            Err(other) => panic!("unexpected error: {other}"),
        }
        let written = std::fs::metadata(dir.path().join("big.bin"))
            .map(|m| m.len())
            .unwrap_or(0);
        assert!(written <= 1024);
    }

    #[tokio::test]
    async fn test_allowed_programs() {
        let ctx = SandboxContext::new(std::env::temp_dir());
        let tool = CommandTool::with_allowed_programs(vec!["echo".into()]);
        assert!(tool.invoke(run("echo", &["ok"]), &ctx).await.is_ok());
        let err = tool.invoke(run("rm", &["-rf", "x"]), &ctx).await.unwrap_err();
        assert!(matches!(err, InstantlyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_error() {
        let ctx = SandboxContext::new(std::env::temp_dir());
        let err = CommandTool::new()
            .invoke(run("definitely-not-a-real-binary-xyz", &[]), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, InstantlyError::Execution(_)));
    }

    #[tokio::test]
    async fn test_bad_args_type() {
        let ctx = SandboxContext::new(std::env::temp_dir());
        let args = ToolArgs::from_args(vec![json!("echo"), json!("not-a-list")]);
        let err = CommandTool::new().invoke(args, &ctx).await.unwrap_err();
        assert!(matches!(err, InstantlyError::Validation(_)));
    }
}
