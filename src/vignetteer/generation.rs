//! Provider seam for text generation.
//!
//! A [`TextGenerator`] wraps one remote LLM service behind a uniform
//! interface: take a system prompt plus a sequence of context messages,
//! return generated text. It keeps no conversation state of its own — the
//! pipeline's [`ConversationLog`](crate::bus::ConversationLog) owns history,
//! and agents translate it into [`Message`]s per call.
//!
//! Production use goes through [`clients::openai::OpenAIClient`](crate::clients::openai::OpenAIClient);
//! tests implement the trait with scripted mocks.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Mutex;

/// Roles a context message can carry when sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Steering instructions from the pipeline, not shown as dialogue.
    System,
    /// Input attributed to the requesting side of the exchange.
    User,
    /// Output previously produced by the model.
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single context message for a generation call.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Send-able boxed error returned by generation calls.
pub type GenerateError = Box<dyn Error + Send + Sync>;

/// Interface to a remote text-generation service.
///
/// Implementations may fail or hang; the orchestrator wraps every call in a
/// timeout and retry budget, so `generate` only needs to report errors
/// honestly.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the given system prompt and context messages.
    async fn generate(
        &self,
        system_prompt: &str,
        context: &[Message],
    ) -> Result<String, GenerateError>;

    /// Name of the underlying model, for logging.
    fn model_name(&self) -> &str;

    /// Token usage recorded by the last `generate` call, when the provider
    /// reports it. Default implementation reads the slot exposed by
    /// [`usage_slot`](TextGenerator::usage_slot).
    fn last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    /// Implementations that track usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
