//! The memory store handle and its write path.
//!
//! [`MemoryStore`] owns one SQLite connection behind a mutex. Every public
//! operation takes the lock, runs inside a single transaction and releases
//! both before returning, so callers never see partially applied state.
//! Retrieval lives in [`crate::retrieval`], pruning and statistics in
//! [`crate::maintenance`]; they extend the same handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::concepts::{self, prepare_concepts};
use crate::config::{RecallConfig, RetentionConfig, RetrievalConfig};
use crate::error::{Result, StoreError};
use crate::extraction::{ConceptExtractor, WhitespaceExtractor};
use crate::processing::TextProcessor;
use crate::schema::{self, MEMORY_COLUMNS, memory_from_row, to_db_time};
use crate::types::{ConceptId, Memory, MemoryId, NewMemory, WeightedConcept, clamp_importance};

/// Handle to an open memory database.
///
/// The handle is `Send + Sync`; share it by reference or through an `Arc`.
///
/// ```
/// # use recall_core::{MemoryStore, RecallConfig, NewMemory};
/// let store = MemoryStore::open_in_memory(&RecallConfig::default())?;
/// let id = store.store_memory(NewMemory::new("alice", "I play tennis on weekends"))?;
/// assert!(store.get_memory(id)?.is_some());
/// # Ok::<(), recall_core::StoreError>(())
/// ```
pub struct MemoryStore {
    conn: Mutex<Connection>,
    extractor: Arc<dyn ConceptExtractor>,
    pub(crate) processor: TextProcessor,
    pub(crate) retrieval: RetrievalConfig,
    pub(crate) retention: RetentionConfig,
    db_path: PathBuf,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("db_path", &self.db_path)
            .field("retrieval", &self.retrieval)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Open (or create) the database at `config.storage.db_path`.
    ///
    /// The schema is created if it does not exist; an existing database is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory cannot be created
    /// and [`StoreError::Database`] on SQLite failures.
    pub fn open(config: &RecallConfig) -> Result<Self> {
        let conn = schema::open_file(&config.storage)?;
        info!(
            path = %config.storage.db_path.display(),
            wal = config.storage.wal_mode,
            "Memory store opened"
        );
        Ok(Self::from_connection(conn, config, config.storage.db_path.clone()))
    }

    /// Open a private in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &RecallConfig) -> Result<Self> {
        let conn = schema::open_in_memory()?;
        Ok(Self::from_connection(conn, config, PathBuf::from(":memory:")))
    }

    fn from_connection(conn: Connection, config: &RecallConfig, db_path: PathBuf) -> Self {
        Self {
            conn: Mutex::new(conn),
            extractor: Arc::new(WhitespaceExtractor),
            processor: TextProcessor::new(&config.processing),
            retrieval: config.retrieval.clone(),
            retention: config.retention.clone(),
            db_path,
        }
    }

    /// Replace the concept extractor used by [`store_memory`](Self::store_memory)
    /// when a memory arrives without explicit concepts.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn ConceptExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the processor used by
    /// [`process_message`](Self::process_message).
    #[must_use]
    pub fn with_text_processor(mut self, processor: TextProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` in a write transaction. Any error drops the transaction,
    /// which rolls it back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a read transaction for a consistent snapshot.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(behavior)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Persist a memory together with its concept links.
    ///
    /// Concepts come from `new.concepts` when set, otherwise from the
    /// store's extractor. The memory row and every link commit together or
    /// not at all.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for an empty user id or content, NaN
    /// importance, a `created_at` outside years `0..=9999`, or concept
    /// weights outside `(0, 1]`;
    /// [`StoreError::Serialization`] if metadata cannot be encoded;
    /// [`StoreError::Database`] on SQLite failures.
    pub fn store_memory(&self, new: NewMemory) -> Result<MemoryId> {
        let start = Instant::now();
        let prepared = self.prepare(new)?;
        let id = self.write(|tx| insert_memory(tx, &prepared))?;

        debug!(
            memory = %id,
            user = %prepared.new.user_id,
            concepts = prepared.concepts.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Stored memory"
        );
        Ok(id)
    }

    /// Validate `new` and resolve everything the insert needs, outside any
    /// transaction.
    pub(crate) fn prepare(&self, new: NewMemory) -> Result<PreparedMemory> {
        validate_user(&new.user_id)?;
        if new.content.trim().is_empty() {
            return Err(StoreError::invalid("memory content must not be empty"));
        }
        let importance = clamp_importance(new.importance)?;
        let created_at = new.created_at.unwrap_or_else(schema::db_now);
        schema::check_storable(&created_at)?;
        let metadata = new
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let concepts = match &new.concepts {
            Some(explicit) => prepare_concepts(explicit)?,
            None => prepare_concepts(&self.extractor.extract(&new.content))?,
        };

        Ok(PreparedMemory {
            id: MemoryId::new(),
            importance,
            created_at,
            metadata,
            concepts,
            new,
        })
    }

    /// Delete every memory of `user_id` whose content contains `pattern`
    /// (literal, case-sensitive). Concept links go with them.
    ///
    /// An empty pattern is rejected with [`StoreError::Validation`]; it is
    /// never treated as "match everything".
    ///
    /// Returns the deleted ids; an empty vec when nothing matched.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for an empty user id or an empty pattern;
    /// [`StoreError::Database`] on SQLite failures.
    pub fn delete_memories_by_content(&self, user_id: &str, pattern: &str) -> Result<Vec<MemoryId>> {
        validate_user(user_id)?;
        validate_pattern(pattern)?;

        let deleted = self.write(|tx| delete_matching(tx, user_id, pattern))?;

        if deleted.is_empty() {
            debug!(user = %user_id, pattern = %pattern, "No memories matched deletion pattern");
        } else {
            info!(user = %user_id, count = deleted.len(), "Deleted memories by content");
        }
        Ok(deleted)
    }

    /// Set a memory's importance, clamped to `[0.0, 1.0]`.
    ///
    /// Returns `false` if no memory has that id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for NaN; [`StoreError::Database`] on
    /// SQLite failures.
    pub fn update_memory_importance(&self, memory_id: MemoryId, importance: f64) -> Result<bool> {
        let importance = clamp_importance(importance)?;
        let updated = self.write(|tx| {
            let n = tx
                .prepare_cached("UPDATE memories SET importance = ?1 WHERE id = ?2")?
                .execute(params![importance, memory_id.to_string()])?;
            Ok(n > 0)
        })?;

        if updated {
            debug!(memory = %memory_id, importance, "Updated importance");
        } else {
            warn!(memory = %memory_id, "Memory not found for importance update");
        }
        Ok(updated)
    }

    /// Record one access: bump `access_count` and move `last_accessed` to
    /// now (never backwards).
    ///
    /// Returns `false` if no memory has that id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn update_access(&self, memory_id: MemoryId) -> Result<bool> {
        let now = schema::db_now();
        let updated = self.write(|tx| touch(tx, memory_id, &now))?;
        if !updated {
            warn!(memory = %memory_id, "Memory not found for access update");
        }
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Fetch a memory by id without recording an access.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn get_memory(&self, memory_id: MemoryId) -> Result<Option<Memory>> {
        self.read(|tx| {
            let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1");
            Ok(tx
                .prepare_cached(&sql)?
                .query_row(params![memory_id.to_string()], memory_from_row)
                .optional()?)
        })
    }

    /// Concepts linked to a memory, ordered by text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn concepts_for(&self, memory_id: MemoryId) -> Result<Vec<WeightedConcept>> {
        self.read(|tx| concepts::concepts_for(tx, memory_id))
    }

    /// Id of a concept if it has been indexed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn find_concept(&self, text: &str) -> Result<Option<ConceptId>> {
        self.read(|tx| concepts::find_concept(tx, text))
    }

    /// Number of distinct concepts in the index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn concept_count(&self) -> Result<u64> {
        self.read(|tx| {
            let n: i64 = tx.query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    /// Number of memories stored for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn memory_count(&self, user_id: &str) -> Result<u64> {
        self.read(|tx| {
            let n: i64 = tx
                .prepare_cached("SELECT COUNT(*) FROM memories WHERE user_id = ?1")?
                .query_row(params![user_id], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }
}

/// A validated memory ready to insert.
pub(crate) struct PreparedMemory {
    pub(crate) id: MemoryId,
    pub(crate) new: NewMemory,
    importance: f64,
    created_at: DateTime<Utc>,
    metadata: Option<String>,
    concepts: Vec<(String, f64)>,
}

/// Insert a prepared memory and its concept links inside an open transaction.
pub(crate) fn insert_memory(conn: &Connection, memory: &PreparedMemory) -> Result<MemoryId> {
    conn.prepare_cached(
        "INSERT INTO memories (
            id, user_id, content, source_message, conversation_id,
            importance, created_at, access_count, metadata
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
    )?
    .execute(params![
        memory.id.to_string(),
        memory.new.user_id,
        memory.new.content,
        memory.new.source_message,
        memory.new.conversation_id,
        memory.importance,
        to_db_time(&memory.created_at),
        memory.metadata,
    ])?;

    for (text, weight) in &memory.concepts {
        let concept_id = concepts::resolve_concept(conn, text)?;
        concepts::link_memory_to_concept(conn, memory.id, concept_id, *weight)?;
    }
    Ok(memory.id)
}

/// Delete `user_id`'s memories containing `pattern` inside an open
/// transaction, returning their ids in insertion order.
pub(crate) fn delete_matching(conn: &Connection, user_id: &str, pattern: &str) -> Result<Vec<MemoryId>> {
    let ids = {
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM memories
             WHERE user_id = ?1 AND instr(content, ?2) > 0
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![user_id, pattern], |row| {
            let raw: String = row.get(0)?;
            schema::parse_memory_id(0, &raw)
        })?;
        rows.collect::<rusqlite::Result<Vec<MemoryId>>>()?
    };

    let mut delete = conn.prepare_cached("DELETE FROM memories WHERE id = ?1")?;
    for id in &ids {
        delete.execute(params![id.to_string()])?;
    }
    Ok(ids)
}

/// Record one access on `memory_id` inside an open transaction.
pub(crate) fn touch(conn: &Connection, memory_id: MemoryId, now: &DateTime<Utc>) -> Result<bool> {
    let n = conn
        .prepare_cached(
            "UPDATE memories
             SET last_accessed = CASE
                     WHEN last_accessed IS NULL OR last_accessed < ?1 THEN ?1
                     ELSE last_accessed
                 END,
                 access_count = access_count + 1
             WHERE id = ?2",
        )?
        .execute(params![to_db_time(now), memory_id.to_string()])?;
    Ok(n > 0)
}

pub(crate) fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(StoreError::invalid("user id must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(StoreError::invalid("deletion pattern must not be empty"));
    }
    Ok(())
}
