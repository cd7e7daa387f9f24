//! Filesystem tool for Instantly
//!
//! A single `filesystem` tool with four operations: `read`, `write`,
//! `delete` and `exists`. Paths are resolved against the sandbox working
//! directory joined with the tool's base path, and may not escape that root,
//! neither through `..` nor through a symlink.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

use super::{Tool, ToolArgs, ToolMetadata};

/// Lexically normalise `path`, folding `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve symlinks in `path`, which need not exist yet.
///
/// The longest existing prefix is canonicalized and the remaining plain
/// components are appended. A dangling symlink on the way is refused, since
/// writing through it would create its target.
fn canonicalize_partial(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut real) => {
                real.extend(rest.iter().rev());
                return Ok(real);
            }
            Err(e) => {
                if existing.is_symlink() {
                    return Err(InstantlyError::Validation(format!(
                        "Path '{}' goes through a dangling symlink",
                        existing.display()
                    )));
                }
                match existing.file_name() {
                    Some(name) => {
                        rest.push(name.to_os_string());
                        existing.pop();
                    }
                    None => return Err(e.into()),
                }
            }
        }
    }
}

/// File operations rooted at a base directory.
///
/// # Example
/// ```rust
/// use instantly::sandbox::SandboxContext;
/// use instantly::tools::{Tool, ToolArgs};
/// use instantly::tools::filesystem::FileSystemTool;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let dir = std::env::temp_dir();
/// let ctx = SandboxContext::new(&dir);
/// let tool = FileSystemTool::default();
///
/// let args = ToolArgs::from_args(vec![json!("exists"), json!("surely-missing-file.txt")]);
/// assert_eq!(tool.invoke(args, &ctx).await.unwrap(), json!(false));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemTool {
    base_path: PathBuf,
}

impl FileSystemTool {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Resolve `path` under the root and refuse anything outside it.
    fn resolve(&self, path: &str, ctx: &SandboxContext) -> Result<PathBuf> {
        let root = normalize(&ctx.resolve_path(&self.base_path));
        let target = normalize(&root.join(path));
        if !target.starts_with(&root) {
            return Err(InstantlyError::Validation(format!(
                "Path '{}' escapes the base directory",
                path
            )));
        }

        let real_root = canonicalize_partial(&root)?;
        let real_target = canonicalize_partial(&target)?;
        if !real_target.starts_with(&real_root) {
            return Err(InstantlyError::Validation(format!(
                "Path '{}' escapes the base directory through a symlink",
                path
            )));
        }
        Ok(real_target)
    }
}

impl Default for FileSystemTool {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl Tool for FileSystemTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("filesystem", "File system operations")
            .with_tags(["file", "system", "io"])
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "delete", "exists"]
                },
                "path": {"type": "string", "description": "Path relative to the base directory"},
                "content": {"type": "string", "description": "Content for write"}
            },
            "required": ["operation", "path"]
        })
    }

    async fn invoke(&self, args: ToolArgs, ctx: &SandboxContext) -> Result<Value> {
        let operation = args.str_arg(0, "operation")?;
        let path = args.str_arg(1, "path")?;

        match operation.as_str() {
            "read" => {
                let full = self.resolve(&path, ctx)?;
                let content = tokio::fs::read_to_string(&full).await.map_err(|e| {
                    InstantlyError::Execution(format!(
                        "Failed to read file '{}': {}",
                        full.display(),
                        e
                    ))
                })?;
                Ok(Value::String(content))
            }
            "write" => {
                let content = args.opt_str(2, "content")?.ok_or_else(|| {
                    InstantlyError::Validation("Content required for write operation".to_string())
                })?;
                let limit = ctx.resource_limits.max_file_size;
                if content.len() as u64 > limit {
                    return Err(InstantlyError::ResourceLimit(format!(
                        "Write of {} bytes exceeds max file size of {} bytes",
                        content.len(),
                        limit
                    )));
                }
                let full = self.resolve(&path, ctx)?;
                tokio::fs::write(&full, content).await.map_err(|e| {
                    InstantlyError::Execution(format!(
                        "Failed to write file '{}': {}",
                        full.display(),
                        e
                    ))
                })?;
                Ok(Value::Null)
            }
            "delete" => {
                let full = self.resolve(&path, ctx)?;
                tokio::fs::remove_file(&full).await.map_err(|e| {
                    InstantlyError::Execution(format!(
                        "Failed to delete file '{}': {}",
                        full.display(),
                        e
                    ))
                })?;
                Ok(Value::Null)
            }
            "exists" => {
                let full = self.resolve(&path, ctx)?;
                Ok(Value::Bool(tokio::fs::try_exists(&full).await.unwrap_or(false)))
            }
            other => Err(InstantlyError::Validation(format!(
                "Unsupported operation: {}",
                other
            ))),
        }
    }
}
