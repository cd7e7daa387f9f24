//! Providers module - LLM capability boundary
//!
//! This module defines the `LlmProvider` trait consumed by the agent's
//! per-step strategy. Concrete network clients implement it outside this
//! crate; `MockProvider` is the scripted implementation used in tests.
//!
//! # Example
//!
//! ```rust
//! use instantly::providers::{ChatMessage, ChatOptions, LlmProvider, MockProvider};
//!
//! # tokio_test::block_on(async {
//! let provider = MockProvider::new();
//! let messages = vec![ChatMessage::user("Hello!")];
//! let options = ChatOptions::new().with_max_tokens(1000);
//!
//! let response = provider.chat("mock", messages, options).await.unwrap();
//! assert_eq!(response.content, "Mock response");
//! # });
//! ```

mod mock;
mod types;

pub use mock::{MockCall, MockProvider, DEFAULT_MOCK_RESPONSE};
pub use types::{ChatMessage, ChatOptions, ChatResponse, ContentStream, LlmProvider, Role};
