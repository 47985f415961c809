//! Request and response types for AI calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and memory context.
    System,
    /// The human side of the conversation.
    User,
    /// Model replies.
    Assistant,
}

/// One chat turn, serialised in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A chat completion request.
///
/// `None` fields fall back to the client's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Full message list, system prompt first.
    pub messages: Vec<ChatMessage>,
    /// Model override.
    pub model: Option<String>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Response length override.
    pub max_tokens: Option<u32>,
    /// End-user id forwarded for provider-side abuse monitoring.
    pub user: Option<String>,
}

impl ChatRequest {
    /// Request a completion for `messages`.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    /// Tag the request with the end-user id.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user = Some(user_id.into());
        self
    }

    /// Override the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text.
    pub text: String,
    /// Completion tokens reported by the provider.
    pub tokens_generated: u32,
    /// Wall-clock latency of the successful attempt.
    pub latency_ms: u64,
    /// Model that served the request.
    pub model: String,
}

/// Outcome of a moderation check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    /// Whether any category was flagged.
    pub flagged: bool,
    /// Score of every flagged category.
    pub categories: BTreeMap<String, f64>,
}
