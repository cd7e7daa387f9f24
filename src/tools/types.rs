//! Tool types for Instantly
//!
//! This module defines the `Tool` capability every invocable tool implements,
//! the `ToolMetadata` descriptor the registry indexes by name, and the
//! `ToolArgs` bundle of positional and keyword arguments passed on each call.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InstantlyError, Result};
use crate::sandbox::SandboxContext;

/// Version assigned to tools that do not declare one.
pub const DEFAULT_TOOL_VERSION: &str = "1.0.0";

/// Immutable descriptor of a tool.
///
/// # Example
/// ```
/// use instantly::tools::ToolMetadata;
///
/// let meta = ToolMetadata::new("search", "Search the web")
///     .with_tags(["web", "search"])
///     .asynchronous();
/// assert_eq!(meta.version, "1.0.0");
/// assert!(meta.tags.contains("web"));
/// assert!(meta.is_async);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Unique registry key
    pub name: String,
    /// What the tool does, shown to the model
    pub description: String,
    pub version: String,
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
    /// Whether the tool needs credentials to be useful
    pub requires_auth: bool,
    /// Whether the tool performs asynchronous I/O
    pub is_async: bool,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: DEFAULT_TOOL_VERSION.to_string(),
            author: None,
            tags: BTreeSet::new(),
            requires_auth: false,
            is_async: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// Positional and keyword arguments of one tool call.
///
/// Lookups by `(index, name)` accept either calling convention: the
/// positional slot is checked first, then the keyword.
///
/// # Example
/// ```
/// use instantly::tools::ToolArgs;
/// use serde_json::json;
///
/// let args = ToolArgs::new().with_arg(json!("read")).with_kwarg("path", json!("a.txt"));
/// assert_eq!(args.str_arg(0, "operation").unwrap(), "read");
/// assert_eq!(args.str_arg(1, "path").unwrap(), "a.txt");
/// assert!(args.str_arg(2, "content").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional-only arguments.
    pub fn from_args(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Map::new(),
        }
    }

    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Argument at `index`, falling back to keyword `name`. JSON `null` counts as absent.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional(index)
            .or_else(|| self.keyword(name))
            .filter(|v| !v.is_null())
    }

    /// Required string argument.
    ///
    /// # Errors
    /// `Validation` if the argument is missing or not a string.
    pub fn str_arg(&self, index: usize, name: &str) -> Result<String> {
        self.opt_str(index, name)?.ok_or_else(|| {
            InstantlyError::Validation(format!("Missing required argument '{}'", name))
        })
    }

    /// Optional string argument.
    pub fn opt_str(&self, index: usize, name: &str) -> Result<Option<String>> {
        match self.get(index, name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(InstantlyError::Validation(format!(
                "Argument '{}' must be a string, got {}",
                name, other
            ))),
        }
    }

    /// Optional non-negative integer argument.
    pub fn opt_u64(&self, index: usize, name: &str) -> Result<Option<u64>> {
        match self.get(index, name) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                InstantlyError::Validation(format!(
                    "Argument '{}' must be a non-negative integer, got {}",
                    name, v
                ))
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Trait that all tools must implement.
///
/// A tool describes itself with [`ToolMetadata`] and is invoked with
/// [`ToolArgs`] inside a sandbox. Paths, environment lookups and child
/// processes should go through the provided [`SandboxContext`].
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use instantly::error::Result;
/// use instantly::sandbox::SandboxContext;
/// use instantly::tools::{Tool, ToolArgs, ToolMetadata};
///
/// struct Upper;
///
/// #[async_trait]
/// impl Tool for Upper {
///     fn describe(&self) -> ToolMetadata {
///         ToolMetadata::new("upper", "Uppercase a string")
///     }
///
///     async fn invoke(&self, args: ToolArgs, _ctx: &SandboxContext) -> Result<Value> {
///         Ok(json!(args.str_arg(0, "text")?.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Descriptor used for registration and listing.
    fn describe(&self) -> ToolMetadata;

    /// Run the tool.
    async fn invoke(&self, args: ToolArgs, ctx: &SandboxContext) -> Result<Value>;

    /// JSON schema of accepted keyword arguments, shown to the model.
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// Convenience accessor for `describe().name`.
    fn name(&self) -> String {
        self.describe().name
    }
}
