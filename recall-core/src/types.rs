//! Core type definitions for the recall memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub Uuid);

impl ConceptId {
    /// Create a new random concept ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConceptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConceptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Importance assigned to a memory when the caller does not pick one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// A single remembered fact, as persisted in the `memories` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier, assigned at creation.
    pub id: MemoryId,
    /// Owner of the memory.
    pub user_id: String,
    /// The text of the fact.
    pub content: String,
    /// Original utterance that produced this memory.
    pub source_message: Option<String>,
    /// Optional conversation grouping key.
    pub conversation_id: Option<String>,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f64,
    /// Creation time (immutable).
    pub created_at: DateTime<Utc>,
    /// Last retrieval hit, `None` until the first one.
    pub last_accessed: Option<DateTime<Utc>>,
    /// Number of retrieval hits.
    pub access_count: u64,
    /// Opaque structured payload supplied by the caller.
    pub metadata: Option<serde_json::Value>,
}

/// Clamp an importance score into `[0.0, 1.0]`.
///
/// # Errors
/// Returns [`StoreError::Validation`] for NaN, which has no meaningful clamp.
pub fn clamp_importance(importance: f64) -> Result<f64> {
    if importance.is_nan() {
        return Err(StoreError::invalid("importance must be a number"));
    }
    Ok(importance.clamp(0.0, 1.0))
}

/// A concept text paired with how strongly it characterises a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedConcept {
    /// Concept text (normalised by the store before indexing).
    pub text: String,
    /// Link weight in `(0.0, 1.0]`.
    pub weight: f64,
}

impl WeightedConcept {
    /// Create a weighted concept.
    #[must_use]
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

impl From<&str> for WeightedConcept {
    fn from(text: &str) -> Self {
        Self::new(text, 1.0)
    }
}

/// Everything needed to create a memory; built fluently and handed to
/// [`MemoryStore::store_memory`](crate::store::MemoryStore::store_memory).
///
/// ```
/// # use recall_core::types::NewMemory;
/// let new = NewMemory::new("alice", "I like tennis on weekends")
///     .importance(0.8)
///     .conversation("conv-1");
/// assert_eq!(new.user_id, "alice");
/// ```
#[derive(Debug, Clone)]
pub struct NewMemory {
    /// Owner of the memory.
    pub user_id: String,
    /// The text of the fact.
    pub content: String,
    /// Original utterance.
    pub source_message: Option<String>,
    /// Conversation grouping key.
    pub conversation_id: Option<String>,
    /// Creation time; defaults to now.
    pub created_at: Option<DateTime<Utc>>,
    /// Opaque structured payload.
    pub metadata: Option<serde_json::Value>,
    /// Requested importance (clamped on write).
    pub importance: f64,
    /// Explicit concepts. When `None` the store's extractor is used.
    pub concepts: Option<Vec<WeightedConcept>>,
}

impl NewMemory {
    /// Start a new memory for `user_id` with the given content.
    #[must_use]
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            source_message: None,
            conversation_id: None,
            created_at: None,
            metadata: None,
            importance: DEFAULT_IMPORTANCE,
            concepts: None,
        }
    }

    /// Record the utterance this memory was extracted from.
    #[must_use]
    pub fn source_message(mut self, message: impl Into<String>) -> Self {
        self.source_message = Some(message.into());
        self
    }

    /// Attach the memory to a conversation.
    #[must_use]
    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Override the creation timestamp.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Attach an opaque JSON payload.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the importance score.
    #[must_use]
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Supply concepts directly instead of running the extractor.
    #[must_use]
    pub fn concepts<I, C>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<WeightedConcept>,
    {
        self.concepts = Some(concepts.into_iter().map(Into::into).collect());
        self
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// The most frequently retrieved memory of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostAccessed {
    /// Memory id.
    pub id: MemoryId,
    /// Memory content.
    pub content: String,
    /// Number of retrieval hits.
    pub access_count: u64,
}

/// Aggregate metrics for one user's memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// The user these stats describe.
    pub user_id: String,
    /// Number of stored memories.
    pub total: u64,
    /// Mean importance, `0.0` when the user has no memories.
    pub average_importance: f64,
    /// Creation time of the oldest memory.
    pub oldest: Option<DateTime<Utc>>,
    /// Creation time of the newest memory.
    pub newest: Option<DateTime<Utc>>,
    /// Highest `access_count`; ties go to the lowest memory id.
    pub most_accessed: Option<MostAccessed>,
}
