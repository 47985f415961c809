//! Prompt assembly: retrieved memories become a context block appended to
//! the system prompt.
//!
//! ```text
//! system:    <system prompt>\n\n<memory context>
//! ...history
//! user:      <message>
//! ```

use recall_core::RetrievedMemory;

use crate::types::ChatMessage;

/// First line of the memory context block.
pub const MEMORY_CONTEXT_HEADER: &str =
    "Based on our previous conversations, I recall the following information about you:";

/// Render memory contents as a context block, one `- item` per line.
///
/// Returns an empty string when there is nothing to recall.
#[must_use]
pub fn format_memory_context(memories: &[&str]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let mut out = String::from(MEMORY_CONTEXT_HEADER);
    for memory in memories {
        out.push_str("\n- ");
        out.push_str(memory);
    }
    out
}

/// [`format_memory_context`] over retrieval results, in rank order.
#[must_use]
pub fn format_retrieved(memories: &[RetrievedMemory]) -> String {
    let contents: Vec<&str> = memories.iter().map(|m| m.memory.content.as_str()).collect();
    format_memory_context(&contents)
}

/// Assemble the message list for one turn.
///
/// The memory context, when non-empty, is appended to the system prompt
/// after a blank line. History goes between the system prompt and the new
/// user message.
#[must_use]
pub fn build_messages(
    system_prompt: &str,
    memory_context: &str,
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let system = if memory_context.is_empty() {
        system_prompt.to_owned()
    } else {
        format!("{system_prompt}\n\n{memory_context}")
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(message));
    messages
}
