//! Agent module - step loop, state and tool execution
//!
//! The agent is responsible for:
//!
//! - Owning its keyed state and step logs (`AgentState`)
//! - Driving the step loop with optional start/end hooks
//! - Executing tools through the sandbox and publishing their outcomes
//! - Delegating per-step decisions to a pluggable `StepStrategy`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ StepStrategy│<────│    Agent    │────>│ ToolRegistry │
//! │ (LLM / idle)│     │  run loop   │     │  + Sandbox   │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │ AgentState  │────>│  EventBus   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use instantly::agent::{Agent, FnHook, RunOptions};
//!
//! # tokio_test::block_on(async {
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (start_log, end_log) = (Arc::clone(&log), Arc::clone(&log));
//!
//! let agent = Agent::new("demo");
//! let options = RunOptions::with_max_steps(2)
//!     .on_step_start(FnHook::new(move |_: &Agent| {
//!         start_log.lock().unwrap().push("start");
//!         Ok(())
//!     }))
//!     .on_step_end(FnHook::new(move |_: &Agent| {
//!         end_log.lock().unwrap().push("end");
//!         Ok(())
//!     }));
//!
//! agent.run(options).await.unwrap();
//! assert_eq!(*log.lock().unwrap(), vec!["start", "end", "start", "end"]);
//! # });
//! ```

mod r#loop;
pub mod state;
pub mod strategy;

pub use r#loop::{Agent, AgentBuilder, AgentHistory, FnHook, RunOptions, StepHook};
pub use state::AgentState;
pub use strategy::{IdleStrategy, LlmStrategy, StepStrategy};
