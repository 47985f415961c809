//! # Recall Core Library
//!
//! Persistent, per-user memory store for conversational assistants, backed
//! by SQLite.
//!
//! A [`MemoryStore`] keeps free-text memories, indexes them under
//! normalised **concepts** with per-link weights, and answers retrieval
//! queries in one of two modes:
//!
//! - **Concept-ranked** — how many query concepts a memory carries, then
//!   the summed link weight, then importance.
//! - **Substring-ranked** — literal, case-sensitive content match ordered by
//!   importance and recency.
//!
//! [`MemoryStore::process_message`] turns a raw chat message into memories
//! and honours "forget ..." requests in the same call.
//!
//! Every retrieval records an access on exactly the memories it returns.
//! Old, unimportant memories are pruned by [`MemoryStore::prune_old`], and
//! [`MemoryStore::user_stats`] summarises one user's memories.
//!
//! ## Consistency Contract
//!
//! Each public operation runs in a single SQLite transaction: a memory and
//! its concept links are stored together or not at all, and a retrieval's
//! access bookkeeping commits with the read that produced it.
//!
//! ```no_run
//! use recall_core::{MemoryStore, NewMemory, RecallConfig, RetrievalQuery};
//!
//! # fn main() -> recall_core::Result<()> {
//! let store = MemoryStore::open(&RecallConfig::default())?;
//! store.store_memory(NewMemory::new("alice", "I like tennis").concepts(["tennis", "sports"]))?;
//! let hits = store.retrieve(&RetrievalQuery::new("alice", "sports?").concepts(["sports"]))?;
//! assert_eq!(hits[0].memory.content, "I like tennis");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod concepts;
pub mod config;
pub mod error;
pub mod extraction;
pub mod maintenance;
pub mod processing;
pub mod retrieval;
mod schema;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::RecallConfig;
pub use error::{Result, StoreError};
pub use extraction::{ConceptExtractor, KeywordExtractor, WhitespaceExtractor};
pub use processing::{ProcessedMessage, TextProcessor};
pub use retrieval::{RetrievalMode, RetrievalQuery, RetrievalScore, RetrievedMemory};
pub use store::MemoryStore;
pub use types::*;
