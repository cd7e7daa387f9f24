//! Per-step work performed by [`Agent::run`](super::Agent::run).
//!
//! The loop itself only sequences hooks and steps; what a step does is a
//! [`StepStrategy`]. [`LlmStrategy`] asks a model for the next action and
//! executes it through the agent, [`IdleStrategy`] does nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::providers::{ChatMessage, ChatOptions, LlmProvider};
use crate::tools::{ToolArgs, ToolMetadata};

use super::Agent;

/// One unit of task-processing work.
#[async_trait]
pub trait StepStrategy: Send + Sync {
    async fn step(&self, agent: &Agent, step: usize) -> Result<()>;
}

/// Does nothing. Useful when hooks drive all the work.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleStrategy;

#[async_trait]
impl StepStrategy for IdleStrategy {
    async fn step(&self, _agent: &Agent, _step: usize) -> Result<()> {
        Ok(())
    }
}

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Action {
    Tool {
        tool: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
    Thought {
        thought: String,
    },
    Done {
        done: Value,
    },
}

/// Parse a reply as an action, tolerating a surrounding code fence.
fn parse_action(reply: &str) -> Option<Action> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).ok()
}

/// Replace `<secret>name</secret>` placeholders in string arguments.
fn fill_secrets(value: Value, secrets: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) if s.contains("<secret>") => {
            let mut out = s;
            for (name, secret) in secrets {
                let placeholder = format!("<secret>{}</secret>", name);
                if out.contains(&placeholder) {
                    let replacement = match secret {
                        Value::String(v) => v.clone(),
                        other => other.to_string(),
                    };
                    out = out.replace(&placeholder, &replacement);
                }
            }
            Value::String(out)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| fill_secrets(v, secrets)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, fill_secrets(v, secrets)))
                .collect(),
        ),
        other => other,
    }
}

/// Asks an [`LlmProvider`] for the next action each step.
///
/// Replies are recorded as outputs. A JSON reply of the form
/// `{"tool": name, "args": [...], "kwargs": {...}}` runs that tool through
/// [`Agent::execute_tool`]; `{"thought": ...}` is recorded as a thought and
/// `{"done": ...}` pauses the agent. Tool failures are recorded as outputs
/// and do not fail the step.
#[derive(Clone)]
pub struct LlmStrategy {
    provider: Arc<dyn LlmProvider>,
    model: String,
    options: ChatOptions,
    history_window: usize,
}

impl LlmStrategy {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            model,
            options: ChatOptions::new(),
            history_window: 5,
        }
    }

    /// Model, sampling options and history window from config.
    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &AgentConfig) -> Self {
        Self::new(provider)
            .with_model(config.model.clone())
            .with_options(
                ChatOptions::new()
                    .with_temperature(config.temperature)
                    .with_max_tokens(config.max_tokens),
            )
            .with_history_window(config.history_window)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of recent outputs replayed to the model.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(
        agent: &Agent,
        tools: &BTreeMap<String, ToolMetadata>,
        params: &BTreeMap<String, Value>,
    ) -> String {
        let mut prompt = String::from(
            "You are an agent completing a task step by step.\n\
             Reply with exactly one JSON object:\n\
             - {\"tool\": <name>, \"args\": [...], \"kwargs\": {...}} to call a tool\n\
             - {\"thought\": <text>} to think without acting\n\
             - {\"done\": <final answer>} when the task is complete\n",
        );

        if !tools.is_empty() {
            prompt.push_str("\nAvailable tools:\n");
            for (name, meta) in tools {
                let schema = params.get(name).cloned().unwrap_or(Value::Null);
                prompt.push_str(&format!("- {}: {} {}\n", name, meta.description, schema));
            }
        }

        if !agent.sensitive_data().is_empty() {
            let names: Vec<&str> = agent.sensitive_data().keys().map(String::as_str).collect();
            prompt.push_str(&format!(
                "\nSecrets can be passed to tools as <secret>name</secret>. Available: {}\n",
                names.join(", ")
            ));
        }

        if !agent.context().is_empty() {
            prompt.push_str(&format!(
                "\nContext: {}\n",
                Value::Object(agent.context().clone())
            ));
        }
        prompt
    }

    fn build_messages(
        &self,
        agent: &Agent,
        step: usize,
        tools: &BTreeMap<String, ToolMetadata>,
        params: &BTreeMap<String, Value>,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(Self::system_prompt(agent, tools, params))];

        let outputs = agent.history().model_outputs();
        let recent = outputs.len().saturating_sub(self.history_window);
        messages.extend(outputs[recent..].iter().map(ChatMessage::assistant));

        let mut request = format!("Step {}. Task: {}", step + 1, agent.task());
        let pending = agent.pending_tasks();
        if !pending.is_empty() {
            request.push_str(&format!("\nQueued follow-up tasks: {}", pending.join("; ")));
        }
        messages.push(ChatMessage::user(request));
        messages
    }

    async fn run_tool(
        &self,
        agent: &Agent,
        tool: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) {
        agent
            .state()
            .record_action(json!({"tool": tool, "args": args, "kwargs": kwargs}));

        let secrets = agent.sensitive_data();
        let call = ToolArgs {
            args: args.into_iter().map(|v| fill_secrets(v, secrets)).collect(),
            kwargs: kwargs
                .into_iter()
                .map(|(k, v)| (k, fill_secrets(v, secrets)))
                .collect(),
        };
        let url = (tool == "visit_webpage")
            .then(|| call.opt_str(0, "url").ok().flatten())
            .flatten();

        match agent.execute_tool(&tool, call).await {
            Ok(result) => {
                if let Some(url) = url {
                    agent.state().record_url(url);
                }
                agent
                    .state()
                    .record_content(json!({"tool": tool, "result": result}));
            }
            Err(e) => {
                warn!(tool = %tool, error = %e, "Tool call from model failed");
                agent
                    .state()
                    .record_output(format!("Tool '{}' failed: {}", tool, e));
            }
        }
    }
}

impl std::fmt::Debug for LlmStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmStrategy")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("options", &self.options)
            .field("history_window", &self.history_window)
            .finish()
    }
}

#[async_trait]
impl StepStrategy for LlmStrategy {
    async fn step(&self, agent: &Agent, step: usize) -> Result<()> {
        let tools = agent.tools().await;
        let params = agent.tool_parameters().await;
        let messages = self.build_messages(agent, step, &tools, &params);

        let reply = self
            .provider
            .chat(&self.model, messages, self.options.clone())
            .await?;
        agent.state().record_output(reply.content.clone());

        match parse_action(&reply.content) {
            Some(Action::Tool { tool, args, kwargs }) => {
                debug!(tool = %tool, "Model requested tool");
                self.run_tool(agent, tool, args, kwargs).await;
            }
            Some(Action::Thought { thought }) => agent.state().record_thought(thought),
            Some(Action::Done { done }) => {
                debug!(answer = %done, "Model reported task done");
                agent.pause();
            }
            None => {}
        }
        Ok(())
    }
}
