//! Chat completion providers
//!
//! The turn handler only needs one thing from a language model: given the
//! persona instruction and one user utterance, return the generated reply
//! (or nothing).

mod openai;

pub use openai::{MAX_TOKENS, OpenAIChat, TEMPERATURE};

use async_trait::async_trait;

use crate::Result;

/// Trait for chat completion providers
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Request a single completion for a system instruction and one user message
    ///
    /// Returns `None` when the provider answered without any content.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response cannot be parsed
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<Option<String>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
