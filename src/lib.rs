//! Instantly - agent execution core
//!
//! An event bus, per-agent state, a tool registry and a sandbox that runs
//! every tool call under resource limits with an isolated working directory
//! and environment.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod providers;
pub mod sandbox;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{Agent, AgentBuilder, AgentState, RunOptions};
pub use bus::{Event, EventBus, EventKind, EventType, StateChangeEvent, ToolExecutionEvent};
pub use config::Config;
pub use error::{InstantlyError, Result};
pub use providers::{ChatMessage, ChatOptions, ChatResponse, LlmProvider, MockProvider};
pub use sandbox::{ResourceLimits, Sandbox, SandboxConfig, SandboxContext};
pub use session::{SessionStore, TaskRecord};
pub use tools::{Tool, ToolArgs, ToolMetadata, ToolRegistry};
