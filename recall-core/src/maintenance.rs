//! Retention pruning and per-user statistics.
//!
//! Pruning removes memories that are both old and unimportant:
//!
//! ```text
//! created_at < now - retention_days   AND   importance < threshold
//! ```
//!
//! Concept links go with the memory through `ON DELETE CASCADE`; concepts
//! themselves are kept.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::schema::{parse_db_time, parse_memory_id, to_db_time};
use crate::store::{MemoryStore, validate_user};
use crate::types::{MostAccessed, UserStats};

impl MemoryStore {
    /// Delete memories older than `retention_days` whose importance is
    /// strictly below `importance_threshold`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for a NaN threshold;
    /// [`StoreError::Database`] on SQLite failures.
    pub fn prune_old(&self, retention_days: u32, importance_threshold: f64) -> Result<usize> {
        if importance_threshold.is_nan() {
            return Err(StoreError::invalid("importance threshold must be a number"));
        }
        let start = Instant::now();
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed = self.write(|tx| {
            Ok(tx
                .prepare_cached("DELETE FROM memories WHERE created_at < ?1 AND importance < ?2")?
                .execute(params![to_db_time(&cutoff), importance_threshold])?)
        })?;

        if removed > 0 {
            info!(
                removed,
                retention_days,
                importance_threshold,
                elapsed_us = start.elapsed().as_micros(),
                "Pruned old memories"
            );
        } else {
            debug!(retention_days, importance_threshold, "Nothing to prune");
        }
        Ok(removed)
    }

    /// [`prune_old`](Self::prune_old) with the configured retention policy.
    ///
    /// # Errors
    ///
    /// Same as [`prune_old`](Self::prune_old).
    pub fn prune_with_policy(&self) -> Result<usize> {
        self.prune_old(
            self.retention.retention_days,
            self.retention.importance_threshold,
        )
    }

    /// Aggregate metrics over one user's memories, from a single snapshot.
    ///
    /// A user with no memories gets zero totals and no extremes.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for an empty user id;
    /// [`StoreError::Database`] on SQLite failures.
    pub fn user_stats(&self, user_id: &str) -> Result<UserStats> {
        validate_user(user_id)?;

        self.read(|tx| {
            let (total, average_importance, oldest, newest) = tx
                .prepare_cached(
                    "SELECT COUNT(*), COALESCE(AVG(importance), 0.0), MIN(created_at), MAX(created_at)
                     FROM memories WHERE user_id = ?1",
                )?
                .query_row(params![user_id], |row| {
                    let total: i64 = row.get(0)?;
                    let average: f64 = row.get(1)?;
                    let oldest: Option<String> = row.get(2)?;
                    let newest: Option<String> = row.get(3)?;
                    Ok((
                        u64::try_from(total).unwrap_or(0),
                        average,
                        oldest.map(|raw| parse_db_time(2, &raw)).transpose()?,
                        newest.map(|raw| parse_db_time(3, &raw)).transpose()?,
                    ))
                })?;

            let most_accessed = tx
                .prepare_cached(
                    "SELECT id, content, access_count FROM memories
                     WHERE user_id = ?1
                     ORDER BY access_count DESC, id ASC
                     LIMIT 1",
                )?
                .query_row(params![user_id], |row| {
                    let id: String = row.get(0)?;
                    let count: i64 = row.get(2)?;
                    Ok(MostAccessed {
                        id: parse_memory_id(0, &id)?,
                        content: row.get(1)?,
                        access_count: u64::try_from(count).unwrap_or(0),
                    })
                })
                .optional()?;

            Ok(UserStats {
                user_id: user_id.to_owned(),
                total,
                average_importance,
                oldest,
                newest,
                most_accessed,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecallConfig;
    use crate::types::NewMemory;

    fn store() -> MemoryStore {
        MemoryStore::open_in_memory(&RecallConfig::default()).expect("open")
    }

    fn aged(store: &MemoryStore, content: &str, days: i64, importance: f64) {
        store
            .store_memory(
                NewMemory::new("u", content)
                    .importance(importance)
                    .created_at(Utc::now() - Duration::days(days))
                    .concepts(["aged"]),
            )
            .expect("store");
    }

    #[test]
    fn prune_removes_only_old_and_unimportant() {
        let store = store();
        aged(&store, "old trivial", 60, 0.1);
        aged(&store, "old vital", 60, 0.9);
        aged(&store, "new trivial", 5, 0.1);

        assert_eq!(store.prune_old(30, 0.5).expect("prune"), 1);
        assert_eq!(store.memory_count("u").expect("count"), 2);

        // Second run is a no-op.
        assert_eq!(store.prune_old(30, 0.5).expect("prune again"), 0);
        // The concept survives even though a linked memory went.
        assert!(store.find_concept("aged").expect("find").is_some());
    }

    #[test]
    fn prune_threshold_is_strict() {
        let store = store();
        aged(&store, "edge", 60, 0.5);
        assert_eq!(store.prune_old(30, 0.5).expect("prune"), 0);
        assert_eq!(store.prune_old(30, 0.51).expect("prune"), 1);
    }

    #[test]
    fn prune_zero_days_uses_now_as_cutoff() {
        let store = store();
        aged(&store, "yesterday", 1, 0.0);
        assert_eq!(store.prune_old(0, 0.1).expect("prune"), 1);
    }

    #[test]
    fn prune_huge_retention_keeps_everything() {
        let store = store();
        aged(&store, "ancient", 3650, 0.0);
        assert_eq!(store.prune_old(u32::MAX, 1.0).expect("prune"), 0);
    }

    #[test]
    fn prune_rejects_nan() {
        assert!(matches!(
            store().prune_old(30, f64::NAN),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn prune_with_policy_uses_config() {
        let mut config = RecallConfig::default();
        config.retention.retention_days = 10;
        config.retention.importance_threshold = 0.6;
        let store = MemoryStore::open_in_memory(&config).expect("open");
        aged(&store, "old", 20, 0.5);
        aged(&store, "recent", 2, 0.5);
        assert_eq!(store.prune_with_policy().expect("prune"), 1);
    }

    #[test]
    fn stats_for_populated_user() {
        let store = store();
        aged(&store, "first", 10, 0.2);
        aged(&store, "second", 3, 0.8);
        let second = store
            .store_memory(NewMemory::new("u", "third").importance(0.5))
            .expect("store");
        store.update_access(second).expect("touch");
        store.update_access(second).expect("touch");
        store
            .store_memory(NewMemory::new("other", "not counted").importance(1.0))
            .expect("store");

        let stats = store.user_stats("u").expect("stats");
        assert_eq!(stats.user_id, "u");
        assert_eq!(stats.total, 3);
        assert!((stats.average_importance - 0.5).abs() < 1e-9);
        let oldest = stats.oldest.expect("oldest");
        let newest = stats.newest.expect("newest");
        assert!(oldest < newest);
        let top = stats.most_accessed.expect("most accessed");
        assert_eq!(top.id, second);
        assert_eq!(top.content, "third");
        assert_eq!(top.access_count, 2);
    }

    #[test]
    fn stats_tie_goes_to_lowest_id() {
        let store = store();
        let a = store.store_memory(NewMemory::new("u", "a")).expect("a");
        let b = store.store_memory(NewMemory::new("u", "b")).expect("b");
        let top = store
            .user_stats("u")
            .expect("stats")
            .most_accessed
            .expect("some");
        assert_eq!(top.id, a.min(b));
        assert_eq!(top.access_count, 0);
    }

    #[test]
    fn stats_for_unknown_user_are_empty() {
        let stats = store().user_stats("nobody").expect("stats");
        assert_eq!(stats.total, 0);
        assert!(stats.average_importance.abs() < f64::EPSILON);
        assert!(stats.oldest.is_none());
        assert!(stats.newest.is_none());
        assert!(stats.most_accessed.is_none());
    }
}
