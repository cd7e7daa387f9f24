//! Scripted provider for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{InstantlyError, Result};

use super::{ChatMessage, ChatOptions, ChatResponse, ContentStream, LlmProvider};

/// Reply used once the scripted responses run out.
pub const DEFAULT_MOCK_RESPONSE: &str = "Mock response";

/// One recorded request.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: ChatOptions,
}

/// Provider that replays scripted replies in order and records every call.
///
/// # Example
/// ```
/// use instantly::providers::{ChatMessage, ChatOptions, LlmProvider, MockProvider};
///
/// # tokio_test::block_on(async {
/// let provider = MockProvider::with_responses(["first"]);
/// let msgs = vec![ChatMessage::user("hi")];
/// let a = provider.chat("m", msgs.clone(), ChatOptions::new()).await.unwrap();
/// let b = provider.chat("m", msgs, ChatOptions::new()).await.unwrap();
/// assert_eq!(a.content, "first");
/// assert_eq!(b.content, "Mock response");
/// assert_eq!(provider.call_count(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<String>>>,
    stream_chunks: Vec<String>,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            stream_chunks: vec!["Mock".to_string(), " response".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that answers with `responses` in order, then the default reply.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for r in responses {
            provider.push_response(r);
        }
        provider
    }

    /// Replace the fragments yielded by `chat_stream`.
    pub fn with_stream_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Queue a reply.
    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_responses().push_back(Ok(response.into()));
    }

    /// Queue a failure; the matching `chat` call returns a `Provider` error.
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_responses()
            .push_back(Err(InstantlyError::Provider(message.into())));
    }

    /// Every request seen so far, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.responses.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, model: &str, messages: Vec<ChatMessage>, options: ChatOptions) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(MockCall {
                model: model.to_string(),
                messages,
                options,
            });
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ChatResponse> {
        self.record(model, messages, options);
        let next = self.lock_responses().pop_front();
        match next {
            Some(reply) => reply.map(ChatResponse::text),
            None => Ok(ChatResponse::text(DEFAULT_MOCK_RESPONSE)),
        }
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ContentStream> {
        self.record(model, messages, options);
        let chunks: Vec<Result<String>> = self.stream_chunks.iter().cloned().map(Ok).collect();
        Ok(stream::iter(chunks).boxed())
    }

    fn default_model(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "mock"
    }
}
