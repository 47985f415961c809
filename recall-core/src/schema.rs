//! SQLite schema and connection setup.
//!
//! Three tables back the store:
//!
//! ```sql
//! CREATE TABLE memories (
//!     id              TEXT PRIMARY KEY,
//!     user_id         TEXT NOT NULL,
//!     content         TEXT NOT NULL,
//!     source_message  TEXT,
//!     conversation_id TEXT,
//!     importance      REAL NOT NULL DEFAULT 0.5,
//!     created_at      TEXT NOT NULL,
//!     last_accessed   TEXT,
//!     access_count    INTEGER NOT NULL DEFAULT 0,
//!     metadata        TEXT
//! );
//! CREATE TABLE concepts (id TEXT PRIMARY KEY, text TEXT NOT NULL UNIQUE);
//! CREATE TABLE memory_concepts (
//!     memory_id  TEXT REFERENCES memories(id) ON DELETE CASCADE,
//!     concept_id TEXT REFERENCES concepts(id) ON DELETE CASCADE,
//!     weight     REAL NOT NULL DEFAULT 1.0,
//!     PRIMARY KEY (memory_id, concept_id)
//! );
//! ```
//!
//! Timestamps are fixed-width RFC 3339 UTC strings (microsecond precision,
//! `Z` suffix), so string comparison in SQL is chronological comparison.

use std::time::Duration;

use chrono::{DateTime, Datelike, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::types::{Memory, MemoryId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    content         TEXT NOT NULL,
    source_message  TEXT,
    conversation_id TEXT,
    importance      REAL NOT NULL DEFAULT 0.5,
    created_at      TEXT NOT NULL,
    last_accessed   TEXT,
    access_count    INTEGER NOT NULL DEFAULT 0,
    metadata        TEXT
);

CREATE TABLE IF NOT EXISTS concepts (
    id   TEXT PRIMARY KEY,
    text TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS memory_concepts (
    memory_id  TEXT NOT NULL,
    concept_id TEXT NOT NULL,
    weight     REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (memory_id, concept_id),
    FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE,
    FOREIGN KEY (concept_id) REFERENCES concepts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_memories_user_id ON memories(user_id);
CREATE INDEX IF NOT EXISTS idx_memories_conversation_id ON memories(conversation_id);
CREATE INDEX IF NOT EXISTS idx_memory_concepts_concept_id ON memory_concepts(concept_id);
";

/// Column list matching [`memory_from_row`].
pub(crate) const MEMORY_COLUMNS: &str = "m.id, m.user_id, m.content, m.source_message, \
     m.conversation_id, m.importance, m.created_at, m.last_accessed, m.access_count, m.metadata";

/// Open (or create) the database file described by `config`.
pub(crate) fn open_file(config: &StorageConfig) -> Result<Connection> {
    let path = config.db_path.as_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;

    if config.wal_mode {
        // journal_mode returns the resulting mode as a row.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(path = %path.display(), mode = %mode, "Journal mode set");
    }
    prepare(&conn, config.busy_timeout_ms)?;
    Ok(conn)
}

/// Open a private in-memory database with the schema applied.
pub(crate) fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn, 0)?;
    Ok(conn)
}

fn prepare(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    init(conn)
}

/// Create tables and indices. Safe to run against an existing database.
pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Value conversions
// ---------------------------------------------------------------------------

/// Current time at the precision the database keeps.
pub(crate) fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Reject timestamps the fixed-width text encoding cannot hold.
///
/// Years outside `0..=9999` format with a sign or a fifth digit, which
/// breaks both parsing and chronological string comparison.
pub(crate) fn check_storable(at: &DateTime<Utc>) -> Result<()> {
    if (0..=9999).contains(&at.year()) {
        Ok(())
    } else {
        Err(StoreError::invalid(format!(
            "timestamp year {} is outside 0..=9999",
            at.year()
        )))
    }
}

/// Format a timestamp for storage.
pub(crate) fn to_db_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp in column `idx`.
pub(crate) fn parse_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a stored id in column `idx`.
pub(crate) fn parse_memory_id(idx: usize, raw: &str) -> rusqlite::Result<MemoryId> {
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a row selected with [`MEMORY_COLUMNS`] into a [`Memory`].
pub(crate) fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(6)?;
    let last_accessed: Option<String> = row.get(7)?;
    let access_count: i64 = row.get(8)?;
    let metadata: Option<String> = row.get(9)?;

    let metadata = metadata
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
            })
        })
        .transpose()?;

    Ok(Memory {
        id: parse_memory_id(0, &id)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        source_message: row.get(3)?,
        conversation_id: row.get(4)?,
        importance: row.get(5)?,
        created_at: parse_db_time(6, &created_at)?,
        last_accessed: last_accessed.map(|raw| parse_db_time(7, &raw)).transpose()?,
        access_count: u64::try_from(access_count).unwrap_or(0),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare");
        stmt.query_map([], |row| row.get(0))
            .expect("query")
            .collect::<rusqlite::Result<Vec<String>>>()
            .expect("rows")
    }

    #[test]
    fn schema_creates_three_tables() {
        let conn = open_in_memory().expect("open");
        let names = table_names(&conn);
        assert_eq!(names, vec!["concepts", "memories", "memory_concepts"]);
    }

    #[test]
    fn init_is_idempotent() {
        let conn = open_in_memory().expect("open");
        conn.execute(
            "INSERT INTO concepts (id, text) VALUES ('c1', 'tennis')",
            [],
        )
        .expect("insert");
        init(&conn).expect("second init");
        init(&conn).expect("third init");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = open_in_memory().expect("open");
        let result = conn.execute(
            "INSERT INTO memory_concepts (memory_id, concept_id) VALUES ('nope', 'nada')",
            [],
        );
        assert!(result.is_err(), "dangling link must be rejected");
    }

    #[test]
    fn stored_times_sort_chronologically() {
        let base = Utc::now();
        let earlier = to_db_time(&(base - ChronoDuration::microseconds(1)));
        let later = to_db_time(&base);
        let much_later = to_db_time(&(base + ChronoDuration::days(400)));
        assert!(earlier < later);
        assert!(later < much_later);
        assert_eq!(earlier.len(), later.len());
    }

    #[test]
    fn time_round_trip_keeps_micros() {
        let now = Utc::now();
        let parsed = parse_db_time(0, &to_db_time(&now)).expect("parse");
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn four_digit_years_are_storable_and_parse_back() {
        use chrono::TimeZone;
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).single().expect("date");
        let first = Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).single().expect("date");
        for at in [first, last] {
            check_storable(&at).expect("storable");
            let parsed = parse_db_time(0, &to_db_time(&at)).expect("parse");
            assert_eq!(parsed, at);
        }
        assert!(to_db_time(&first) < to_db_time(&last));
    }

    #[test]
    fn five_digit_and_negative_years_are_rejected() {
        use chrono::TimeZone;
        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).single().expect("date");
        let bce = Utc.with_ymd_and_hms(-1, 6, 1, 0, 0, 0).single().expect("date");
        assert!(matches!(check_storable(&far), Err(StoreError::Validation(_))));
        assert!(matches!(check_storable(&bce), Err(StoreError::Validation(_))));
    }
}
