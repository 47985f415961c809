//! # recall-llm — AI Provider Boundary for Recall
//!
//! Everything that talks to a language model lives here, outside the store:
//!   - **Chat completions** for responses grounded in recalled memories
//!   - **Embeddings** for callers that want vectors alongside concepts
//!   - **Moderation** of user content before it is remembered
//!
//! The backend is an [`AiProvider`] picked once, at construction time, from
//! [`AiConfig`](recall_core::config::AiConfig). A disabled provider makes
//! every call fail with [`AiError::Unavailable`], so callers can degrade to
//! a memory-only reply.
//!
//! # Flow
//!
//! ```text
//! MemoryStore::retrieve ──► prompt::format_retrieved ──► prompt::build_messages
//!                                                             │
//!                                                             ▼
//!                                             AiClient::generate_response
//! ```
//!
//! [`AiClient::respond_with_memories`] runs the whole chain with the
//! configured system prompt.

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{AiClient, AiProvider};
pub use error::AiError;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ModerationResult, Role};
