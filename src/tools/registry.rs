//! Tool registry for Instantly
//!
//! This module provides the `ToolRegistry` struct for managing and executing tools.
//! Names are unique: registering a duplicate fails, and looking up or
//! unregistering an unknown name fails. Execution always goes through the sandbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::error::{InstantlyError, Result};
use crate::sandbox::{Sandbox, SandboxConfig};

use super::{Tool, ToolArgs, ToolMetadata};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use instantly::sandbox::SandboxConfig;
/// use instantly::tools::{EchoTool, ToolArgs, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(EchoTool).unwrap();
/// assert!(registry.has("echo"));
///
/// let result = registry
///     .execute("echo", ToolArgs::from_args(vec![json!("hello")]), None, &SandboxConfig::default())
///     .await;
/// assert_eq!(result.unwrap(), json!("hello"));
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `tool.describe().name`.
    ///
    /// # Errors
    /// `DuplicateName` if the name is taken; the existing tool is kept.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.describe().name;
        if self.tools.contains_key(&name) {
            return Err(InstantlyError::DuplicateName(name));
        }
        info!(tool = %name, "Registering tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool.
    ///
    /// # Errors
    /// `NotFound` if no tool has that name.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn Tool>> {
        let tool = self
            .tools
            .remove(name)
            .ok_or_else(|| InstantlyError::NotFound(format!("Tool not found: {}", name)))?;
        self.order.retain(|n| n != name);
        info!(tool = %name, "Unregistered tool");
        Ok(tool)
    }

    /// Look up a tool by name.
    ///
    /// # Errors
    /// `NotFound` if no tool has that name.
    pub fn get_tool(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| InstantlyError::NotFound(format!("Tool not found: {}", name)))
    }

    /// Metadata of every tool, in registration order.
    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.describe())
            .collect()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name inside the sandbox.
    ///
    /// `sandbox_config` is the caller's base configuration; fields set in
    /// `overrides` take precedence over it.
    pub async fn execute(
        &self,
        name: &str,
        args: ToolArgs,
        sandbox_config: Option<&SandboxConfig>,
        overrides: &SandboxConfig,
    ) -> Result<Value> {
        let tool = self.get_tool(name)?;
        Self::execute_tool(tool, args, sandbox_config, overrides).await
    }

    /// Execute an already resolved tool inside the sandbox.
    ///
    /// Lets callers resolve under a lock and release it before awaiting.
    pub async fn execute_tool(
        tool: Arc<dyn Tool>,
        args: ToolArgs,
        sandbox_config: Option<&SandboxConfig>,
        overrides: &SandboxConfig,
    ) -> Result<Value> {
        let name = tool.describe().name;
        let config = sandbox_config.cloned().unwrap_or_default().merge(overrides);
        let start = Instant::now();

        let result = Sandbox::run(&config, |ctx| async move { tool.invoke(args, &ctx).await }).await;

        match &result {
            Ok(_) => info!(
                tool = %name,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool executed successfully"
            ),
            Err(e) => error!(
                tool = %name,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool execution failed"
            ),
        }
        result
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
