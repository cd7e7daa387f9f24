//! Provider types for Instantly
//!
//! This module defines the `LlmProvider` trait and the message, option and
//! response types exchanged with it.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stream of incremental content fragments from a model reply.
pub type ContentStream = BoxStream<'static, Result<String>>;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

/// One entry in the ordered message list sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Trait for LLM providers.
///
/// Implement this trait to plug a model into the agent. Wire protocols live
/// outside this crate; the agent only consumes this capability.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request to the model.
    ///
    /// # Arguments
    /// * `model` - Model identifier
    /// * `messages` - The conversation, oldest first
    /// * `options` - Sampling options
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ChatResponse>;

    /// Streaming variant of [`chat`](Self::chat).
    ///
    /// The default implementation yields the full `chat` reply as a single
    /// fragment.
    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ContentStream> {
        let response = self.chat(model, messages, options).await?;
        Ok(stream::once(async move { Ok(response.content) }).boxed())
    }

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Sampling knobs for one request. Unset fields use the provider's defaults.
///
/// ```
/// use instantly::providers::ChatOptions;
///
/// let options = ChatOptions::new().with_temperature(0.2).with_max_tokens(512);
/// assert_eq!(options.max_tokens, Some(512));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A complete model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}
