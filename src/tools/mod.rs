//! Tools module - Tool definitions and sandboxed execution
//!
//! This module provides the infrastructure for defining tools and running
//! them inside a sandbox on behalf of an agent.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolArgs`: Positional and keyword arguments of one call
//! - `ToolRegistry`: Name-unique registry that executes tools in the sandbox
//!
//! # Built-in Tools
//!
//! - `EchoTool`: Simple echo tool for testing
//! - `WebSearchTool` / `DuckDuckGoSearchTool`: Web search
//! - `VisitWebpageTool`: Fetch a page and extract its text
//! - `FileSystemTool`: Read, write, delete and test files under a base path
//! - `ApiRequestTool`: HTTP requests against a base URL
//! - `CommandTool`: Run a program as a sandboxed child process
//! - `SqliteTool`: SQL against a database file (feature `tool-sqlite`)
//!
//! # Example
//!
//! ```rust
//! use instantly::sandbox::SandboxConfig;
//! use instantly::tools::{EchoTool, ToolArgs, ToolRegistry};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(EchoTool).unwrap();
//!
//! let args = ToolArgs::new().with_kwarg("text", json!("Hello!"));
//! let result = registry
//!     .execute("echo", args, None, &SandboxConfig::default())
//!     .await;
//! assert_eq!(result.unwrap(), json!("Hello!"));
//! # });
//! ```

pub mod filesystem;
pub mod http_request;
mod registry;
pub mod shell;
#[cfg(feature = "tool-sqlite")]
pub mod sqlite;
mod types;
pub mod web;

pub use filesystem::FileSystemTool;
pub use http_request::ApiRequestTool;
pub use registry::ToolRegistry;
pub use shell::CommandTool;
#[cfg(feature = "tool-sqlite")]
pub use sqlite::SqliteTool;
pub use types::{Tool, ToolArgs, ToolMetadata, DEFAULT_TOOL_VERSION};
pub use web::{DuckDuckGoSearchTool, VisitWebpageTool, WebSearchTool};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ToolsConfig;
use crate::error::Result;
use crate::sandbox::SandboxContext;

/// A simple echo tool for testing purposes.
///
/// Returns its `text` argument unchanged.
///
/// # Example
///
/// ```rust
/// use instantly::sandbox::SandboxContext;
/// use instantly::tools::{EchoTool, Tool, ToolArgs};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let ctx = SandboxContext::new(std::env::temp_dir());
/// let result = EchoTool.invoke(ToolArgs::from_args(vec![json!("Hello")]), &ctx).await;
/// assert_eq!(result.unwrap(), json!("Hello"));
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn describe(&self) -> ToolMetadata {
        ToolMetadata::new("echo", "Echoes back the provided text").with_tags(["testing"])
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo"
                }
            },
            "required": ["text"]
        })
    }

    async fn invoke(&self, args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
        Ok(Value::String(args.str_arg(0, "text")?))
    }
}

/// Build the built-in tool set described by `config`.
///
/// Disabled names are skipped. The SQLite tool is only included when the
/// `tool-sqlite` feature is on and a database path is configured.
pub fn default_tools(config: &ToolsConfig) -> Result<Vec<Arc<dyn Tool>>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(WebSearchTool::new(
            &config.web.search_engine,
            config.web.search_max_results,
        )?),
        Arc::new(DuckDuckGoSearchTool::with_max_results(
            config.web.duckduckgo_max_results,
        )),
        Arc::new(VisitWebpageTool::new(config.web.webpage_max_length)),
        Arc::new(FileSystemTool::new(&config.filesystem.base_path)),
        Arc::new(ApiRequestTool::new(
            config.api_request.base_url.clone(),
            config.api_request.headers.clone(),
        )),
        Arc::new(CommandTool::with_allowed_programs(
            config.command.allowed_programs.clone(),
        )),
    ];

    #[cfg(feature = "tool-sqlite")]
    if let Some(db_path) = &config.sqlite.db_path {
        tools.push(Arc::new(SqliteTool::new(db_path)));
    }

    tools.retain(|tool| config.is_enabled(&tool.name()));
    Ok(tools)
}
