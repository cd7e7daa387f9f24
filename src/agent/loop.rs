//! Agent loop implementation
//!
//! This module provides the [`Agent`] aggregate: it owns the agent's state,
//! tool registry and event bus, drives the step loop, and routes every tool
//! call through the sandbox while publishing exactly one terminal event per
//! call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::bus::{Event, EventBus, EventType, ToolExecutionEvent};
use crate::error::{InstantlyError, Result};
use crate::providers::LlmProvider;
use crate::sandbox::SandboxConfig;
use crate::session::TaskRecord;
use crate::tools::{Tool, ToolArgs, ToolMetadata, ToolRegistry};

use super::state::AgentState;
use super::strategy::{IdleStrategy, LlmStrategy, StepStrategy};

/// Callback invoked around each step of [`Agent::run`].
#[async_trait]
pub trait StepHook: Send + Sync {
    async fn call(&self, agent: &Agent) -> Result<()>;
}

/// [`StepHook`] backed by a synchronous closure.
///
/// # Example
/// ```
/// use std::sync::{Arc, Mutex};
/// use instantly::agent::{Agent, FnHook, RunOptions};
///
/// # tokio_test::block_on(async {
/// let seen = Arc::new(Mutex::new(0));
/// let counter = Arc::clone(&seen);
/// let hook = FnHook::new(move |_agent: &Agent| {
///     *counter.lock().unwrap() += 1;
///     Ok(())
/// });
///
/// let agent = Agent::new("count steps");
/// let steps = agent
///     .run(RunOptions::with_max_steps(2).on_step_start(hook))
///     .await
///     .unwrap();
/// assert_eq!(steps, 2);
/// assert_eq!(*seen.lock().unwrap(), 2);
/// # });
/// ```
pub struct FnHook<F> {
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Agent) -> Result<()> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> StepHook for FnHook<F>
where
    F: Fn(&Agent) -> Result<()> + Send + Sync,
{
    async fn call(&self, agent: &Agent) -> Result<()> {
        (self.func)(agent)
    }
}

/// Options for one [`Agent::run`].
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Called before each step
    pub on_step_start: Option<Arc<dyn StepHook>>,
    /// Called after each step
    pub on_step_end: Option<Arc<dyn StepHook>>,
    /// Step ceiling; `None` runs until paused
    pub max_steps: Option<usize>,
}

impl RunOptions {
    /// Unbounded run without hooks.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(max_steps: usize) -> Self {
        Self {
            max_steps: Some(max_steps),
            ..Self::default()
        }
    }

    pub fn on_step_start(mut self, hook: impl StepHook + 'static) -> Self {
        self.on_step_start = Some(Arc::new(hook));
        self
    }

    pub fn on_step_end(mut self, hook: impl StepHook + 'static) -> Self {
        self.on_step_end = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("on_step_start", &self.on_step_start.is_some())
            .field("on_step_end", &self.on_step_end.is_some())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Read-only view over the agent's step logs.
#[derive(Clone, Copy)]
pub struct AgentHistory<'a> {
    state: &'a AgentState,
}

impl AgentHistory<'_> {
    pub fn model_thoughts(&self) -> Vec<String> {
        self.state.thoughts()
    }

    pub fn model_outputs(&self) -> Vec<String> {
        self.state.outputs()
    }

    pub fn model_actions(&self) -> Vec<Value> {
        self.state.actions()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.visited_urls()
    }

    pub fn extracted_content(&self) -> Vec<Value> {
        self.state.extracted_content()
    }
}

/// The agent: task, state, tools and the step loop that ties them together.
///
/// # Example
///
/// ```rust
/// use instantly::agent::Agent;
/// use instantly::bus::EventType;
/// use instantly::tools::{EchoTool, ToolArgs};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let agent = Agent::builder("say hi").tool(EchoTool).build().unwrap();
///
/// let result = agent
///     .execute_tool("echo", ToolArgs::from_args(vec![json!("hi")]))
///     .await
///     .unwrap();
/// assert_eq!(result, json!("hi"));
///
/// let events = agent.event_bus().history(Some(EventType::ToolExecution));
/// assert_eq!(events.len(), 1);
/// # });
/// ```
pub struct Agent {
    id: String,
    task: String,
    pending_tasks: Mutex<Vec<String>>,
    context: Map<String, Value>,
    settings: Map<String, Value>,
    sensitive_data: Map<String, Value>,
    state: AgentState,
    tools: RwLock<ToolRegistry>,
    strategy: Arc<dyn StepStrategy>,
    llm: Option<Arc<dyn LlmProvider>>,
    sandbox_config: SandboxConfig,
    paused: AtomicBool,
    steps_taken: AtomicUsize,
}

impl Agent {
    /// An agent with an idle strategy, no tools and a fresh bus.
    pub fn new(task: impl Into<String>) -> Self {
        Self::builder(task).build_with_registry(ToolRegistry::new())
    }

    pub fn builder(task: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(task)
    }

    /// Identifier used for session records.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Queue a follow-up task.
    pub fn add_new_task(&self, task: impl Into<String>) {
        let task = task.into();
        debug!(task = %task, "Queued follow-up task");
        self.pending_tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(task);
    }

    /// Follow-up tasks in the order they were queued.
    pub fn pending_tasks(&self) -> Vec<String> {
        self.pending_tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn sensitive_data(&self) -> &Map<String, Value> {
        &self.sensitive_data
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// The bus shared by the agent and its state.
    pub fn event_bus(&self) -> &EventBus {
        self.state.event_bus()
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }

    /// Base sandbox configuration applied to every tool call.
    pub fn sandbox_config(&self) -> &SandboxConfig {
        &self.sandbox_config
    }

    pub fn history(&self) -> AgentHistory<'_> {
        AgentHistory { state: &self.state }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Stop the loop before its next step. The current step completes.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Agent paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("Agent resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Steps completed across every run of this agent.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken.load(Ordering::SeqCst)
    }

    /// Drive the step loop.
    ///
    /// Each iteration calls `on_step_start`, one strategy step, then
    /// `on_step_end`. The loop ends when the agent is paused (checked before
    /// each step only) or `max_steps` steps have run.
    ///
    /// # Returns
    /// The number of steps executed by this call.
    ///
    /// # Errors
    /// The first hook or strategy error aborts the run and is returned.
    pub async fn run(&self, options: RunOptions) -> Result<usize> {
        let mut step = 0usize;
        info!(task = %self.task, max_steps = ?options.max_steps, "Agent run starting");

        while !self.is_paused() && options.max_steps.map_or(true, |max| step < max) {
            let span = info_span!("agent_step", step);
            async {
                if let Some(hook) = &options.on_step_start {
                    hook.call(self).await?;
                }
                self.strategy.step(self, step).await?;
                if let Some(hook) = &options.on_step_end {
                    hook.call(self).await?;
                }
                Ok::<(), InstantlyError>(())
            }
            .instrument(span)
            .await?;

            step += 1;
            self.steps_taken.fetch_add(1, Ordering::SeqCst);
        }

        info!(steps = step, paused = self.is_paused(), "Agent run finished");
        Ok(step)
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    /// Register a tool.
    ///
    /// # Errors
    /// `DuplicateName` if a tool with the same name is registered.
    pub async fn register_tool<T: Tool + 'static>(&self, tool: T) -> Result<()> {
        self.tools.write().await.register(tool)
    }

    pub async fn register_tool_arc(&self, tool: Arc<dyn Tool>) -> Result<()> {
        self.tools.write().await.register_arc(tool)
    }

    pub async fn unregister_tool(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools.write().await.unregister(name)
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.has(name)
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Name to metadata snapshot of the registered tools.
    pub async fn tools(&self) -> BTreeMap<String, ToolMetadata> {
        self.tools
            .read()
            .await
            .list_tools()
            .into_iter()
            .map(|meta| (meta.name.clone(), meta))
            .collect()
    }

    /// Tool parameter schemas by name, for prompting.
    pub async fn tool_parameters(&self) -> BTreeMap<String, Value> {
        let tools = self.tools.read().await;
        tools
            .names()
            .into_iter()
            .filter_map(|name| {
                tools
                    .get_tool(name)
                    .ok()
                    .map(|tool| (name.to_string(), tool.parameters()))
            })
            .collect()
    }

    /// Execute a tool under the agent's sandbox configuration.
    ///
    /// See [`execute_tool_with`](Self::execute_tool_with).
    pub async fn execute_tool(&self, name: &str, args: ToolArgs) -> Result<Value> {
        self.execute_tool_with(name, args, &SandboxConfig::default())
            .await
    }

    /// Execute a tool with per-call sandbox overrides.
    ///
    /// Exactly one terminal `ToolExecutionEvent` is dispatched per call,
    /// after the sandboxed call has finished, including when the tool is
    /// unknown.
    ///
    /// # Errors
    /// - the tool's own error, even if a listener also failed
    /// - `Listener` if the tool succeeded but a listener failed
    pub async fn execute_tool_with(
        &self,
        name: &str,
        args: ToolArgs,
        overrides: &SandboxConfig,
    ) -> Result<Value> {
        let positional = args.args.clone();
        let kwargs = args.kwargs.clone();

        // Resolve under the read lock, run without it.
        let tool = self.tools.read().await.get_tool(name);
        let result = match tool {
            Ok(tool) => {
                ToolRegistry::execute_tool(tool, args, Some(&self.sandbox_config), overrides).await
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool lookup failed");
                Err(e)
            }
        };

        let event = match &result {
            Ok(value) => ToolExecutionEvent::success(name, positional, kwargs, value.clone()),
            Err(e) => ToolExecutionEvent::failure(name, positional, kwargs, e.to_string()),
        };
        let published = self.event_bus().dispatch(Event::tool_execution(event)).await;

        match (result, published) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(listener_err)) => Err(listener_err),
            (Err(tool_err), published) => {
                if let Err(listener_err) = published {
                    warn!(
                        tool = %name,
                        error = %listener_err,
                        "Listener failed while publishing tool failure"
                    );
                }
                Err(tool_err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Capture the keyed state and tool-call history as a session record.
    pub fn snapshot(&self) -> Result<TaskRecord> {
        let mut record = TaskRecord::with_id(self.id.clone(), self.task.clone());
        record.state = self.state.to_dict();
        record.items = self
            .event_bus()
            .history(Some(EventType::ToolExecution))
            .iter()
            .map(|event| serde_json::to_value(event.as_ref()))
            .collect::<std::result::Result<Vec<Value>, serde_json::Error>>()?;
        Ok(record)
    }

    /// Replace the keyed state with the record's. No events are published.
    pub fn restore(&self, record: &TaskRecord) {
        debug!(record = %record.id, keys = record.state.len(), "Restoring agent state");
        self.state.load_dict(record.state.clone());
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("task", &self.task)
            .field("paused", &self.is_paused())
            .field("steps_taken", &self.steps_taken())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    id: Option<String>,
    task: String,
    llm: Option<Arc<dyn LlmProvider>>,
    strategy: Option<Arc<dyn StepStrategy>>,
    context: Map<String, Value>,
    settings: Map<String, Value>,
    sensitive_data: Map<String, Value>,
    tools: Vec<Arc<dyn Tool>>,
    sandbox_config: SandboxConfig,
    bus: Option<EventBus>,
}

impl AgentBuilder {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: None,
            task: task.into(),
            llm: None,
            strategy: None,
            context: Map::new(),
            settings: Map::new(),
            sensitive_data: Map::new(),
            tools: Vec::new(),
            sandbox_config: SandboxConfig::default(),
            bus: None,
        }
    }

    /// Use a fixed id instead of a random UUID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Model provider. Without an explicit strategy, steps use [`LlmStrategy`].
    pub fn llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    pub fn strategy(mut self, strategy: impl StepStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn settings(mut self, settings: Map<String, Value>) -> Self {
        self.settings = settings;
        self
    }

    /// Values tools may receive but the model never sees.
    pub fn sensitive_data(mut self, data: Map<String, Value>) -> Self {
        self.sensitive_data = data;
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        self.tools.extend(tools);
        self
    }

    pub fn sandbox_config(mut self, config: SandboxConfig) -> Self {
        self.sandbox_config = config;
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Build the agent.
    ///
    /// # Errors
    /// `DuplicateName` if two tools share a name.
    pub fn build(mut self) -> Result<Agent> {
        let mut registry = ToolRegistry::new();
        for tool in std::mem::take(&mut self.tools) {
            registry.register_arc(tool)?;
        }
        Ok(self.build_with_registry(registry))
    }

    fn build_with_registry(self, registry: ToolRegistry) -> Agent {
        let strategy: Arc<dyn StepStrategy> = match (self.strategy, &self.llm) {
            (Some(strategy), _) => strategy,
            (None, Some(llm)) => Arc::new(LlmStrategy::new(Arc::clone(llm))),
            (None, None) => Arc::new(IdleStrategy),
        };

        Agent {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            task: self.task,
            pending_tasks: Mutex::new(Vec::new()),
            context: self.context,
            settings: self.settings,
            sensitive_data: self.sensitive_data,
            state: AgentState::new(self.bus.unwrap_or_default()),
            tools: RwLock::new(registry),
            strategy,
            llm: self.llm,
            sandbox_config: self.sandbox_config,
            paused: AtomicBool::new(false),
            steps_taken: AtomicUsize::new(0),
        }
    }
}
