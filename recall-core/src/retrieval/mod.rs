//! Memory Retrieval — concept-weighted and substring ranking.
//!
//! Two mutually exclusive strategies, picked by whether the query carries a
//! non-empty concept set:
//!
//! ```text
//! concept-ranked:   concept_matches DESC, relevance_score DESC, importance DESC, rowid ASC
//! substring-ranked: importance DESC, created_at DESC, rowid ASC
//! ```
//!
//! where `concept_matches` is the number of distinct query concepts linked
//! to a memory and `relevance_score` the sum of those link weights. The final
//! `rowid` key (insertion order) makes ties deterministic.
//!
//! Retrieval is read-with-side-effect: every returned memory has its access
//! counter bumped in the same transaction that selected it.

mod query;

pub use query::RetrievalMode;

use std::time::Instant;

use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::concepts::normalize_concept;
use crate::error::{Result, StoreError};
use crate::schema::{db_now, memory_from_row};
use crate::store::{MemoryStore, touch, validate_user};
use crate::types::Memory;

/// Parameters of a retrieval call.
///
/// `limit` and `min_importance` fall back to the store's
/// [`RetrievalConfig`](crate::config::RetrievalConfig) when left unset.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    /// Whose memories to search.
    pub user_id: String,
    /// Free-text query, matched literally in substring mode.
    pub query: String,
    /// Candidate concepts; non-empty selects concept-ranked mode.
    pub concepts: Vec<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Importance floor.
    pub min_importance: Option<f64>,
    /// Restrict to one conversation.
    pub conversation_id: Option<String>,
}

impl RetrievalQuery {
    /// Query `user_id`'s memories for `query`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
            concepts: Vec::new(),
            limit: None,
            min_importance: None,
            conversation_id: None,
        }
    }

    /// Rank by these concepts instead of substring matching.
    #[must_use]
    pub fn concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip memories below this importance.
    #[must_use]
    pub fn min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    /// Only consider memories from one conversation.
    #[must_use]
    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Normalised, de-duplicated concept set.
    fn normalized_concepts(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.concepts.len());
        for concept in &self.concepts {
            let text = normalize_concept(concept);
            if !text.is_empty() && !out.contains(&text) {
                out.push(text);
            }
        }
        out
    }

    /// The ranking strategy this query will use.
    #[must_use]
    pub fn mode(&self) -> RetrievalMode {
        if self.normalized_concepts().is_empty() {
            RetrievalMode::SubstringRanked
        } else {
            RetrievalMode::ConceptRanked
        }
    }
}

/// Ranking breakdown for one result. Both fields are zero in substring mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalScore {
    /// Distinct query concepts linked to the memory.
    pub concept_matches: u32,
    /// Sum of the matching link weights.
    pub relevance_score: f64,
}

/// A retrieved memory with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMemory {
    /// The memory, with the access just recorded already applied.
    pub memory: Memory,
    /// Why it ranked where it did.
    pub score: RetrievalScore,
}

impl MemoryStore {
    /// Retrieve the memories most relevant to `query`, best first.
    ///
    /// Every returned memory (and only those) gets one access recorded.
    /// Ties after the mode's ranking keys are broken by insertion order.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] for an empty user id or NaN
    /// `min_importance`; [`StoreError::Database`] on SQLite failures, in
    /// which case no access is recorded and no results are returned.
    pub fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedMemory>> {
        let start = Instant::now();
        validate_user(&query.user_id)?;
        let min_importance = query.min_importance.unwrap_or(self.retrieval.min_importance);
        if min_importance.is_nan() {
            return Err(StoreError::invalid("min_importance must be a number"));
        }
        let limit = query.limit.unwrap_or(self.retrieval.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let concepts = query.normalized_concepts();
        let filters = query::Filters {
            user_id: &query.user_id,
            conversation_id: query.conversation_id.as_deref(),
            min_importance,
            limit,
        };
        let (mode, (sql, params)) = if concepts.is_empty() {
            (
                RetrievalMode::SubstringRanked,
                query::substring_ranked(&filters, &query.query),
            )
        } else {
            (
                RetrievalMode::ConceptRanked,
                query::concept_ranked(&filters, &concepts),
            )
        };

        let now = db_now();
        let results = self.write(|tx| {
            let mut rows = {
                let mut stmt = tx.prepare(&sql)?;
                let mapped = stmt.query_map(params_from_iter(params.iter()), |row| {
                    let memory = memory_from_row(row)?;
                    let matches: i64 = row.get(10)?;
                    let relevance: Option<f64> = row.get(11)?;
                    Ok(RetrievedMemory {
                        memory,
                        score: RetrievalScore {
                            concept_matches: u32::try_from(matches).unwrap_or(u32::MAX),
                            relevance_score: relevance.unwrap_or(0.0),
                        },
                    })
                })?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for hit in &mut rows {
                touch(tx, hit.memory.id, &now)?;
                hit.memory.access_count += 1;
                hit.memory.last_accessed = Some(match hit.memory.last_accessed {
                    Some(prev) if prev > now => prev,
                    _ => now,
                });
            }
            Ok(rows)
        })?;

        debug!(
            user = %query.user_id,
            mode = ?mode,
            results = results.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Retrieved memories"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecallConfig;
    use crate::types::NewMemory;
    use chrono::{Duration, Utc};

    fn store() -> MemoryStore {
        MemoryStore::open_in_memory(&RecallConfig::default()).expect("open")
    }

    fn contents(results: &[RetrievedMemory]) -> Vec<&str> {
        results.iter().map(|r| r.memory.content.as_str()).collect()
    }

    #[test]
    fn mode_follows_concepts() {
        assert_eq!(RetrievalQuery::new("u", "q").mode(), RetrievalMode::SubstringRanked);
        assert_eq!(
            RetrievalQuery::new("u", "q").concepts(["  "]).mode(),
            RetrievalMode::SubstringRanked
        );
        assert_eq!(
            RetrievalQuery::new("u", "q").concepts(["Sports"]).mode(),
            RetrievalMode::ConceptRanked
        );
    }

    #[test]
    fn concept_ranked_matches_sports() {
        let store = store();
        store
            .store_memory(NewMemory::new("u", "I like tennis").concepts(["tennis", "sports"]))
            .expect("tennis");
        store
            .store_memory(NewMemory::new("u", "I like color blue").concepts(["color"]))
            .expect("color");
        store
            .store_memory(NewMemory::new("u", "I like basketball").concepts(["basketball", "sports"]))
            .expect("basketball");

        let results = store
            .retrieve(&RetrievalQuery::new("u", "sports?").concepts(["sports"]))
            .expect("retrieve");
        assert_eq!(contents(&results), vec!["I like tennis", "I like basketball"]);
        assert!(results.iter().all(|r| r.score.concept_matches == 1));
    }

    #[test]
    fn concept_ranking_order() {
        let store = store();
        // one match, heavy weight, high importance
        store
            .store_memory(
                NewMemory::new("u", "one heavy")
                    .concepts([crate::types::WeightedConcept::new("tennis", 1.0)])
                    .importance(0.9),
            )
            .expect("store");
        // two matches, light weights
        store
            .store_memory(
                NewMemory::new("u", "two light").concepts([
                    crate::types::WeightedConcept::new("tennis", 0.2),
                    crate::types::WeightedConcept::new("sports", 0.2),
                ]),
            )
            .expect("store");
        // one match, lighter weight
        store
            .store_memory(
                NewMemory::new("u", "one light")
                    .concepts([crate::types::WeightedConcept::new("sports", 0.5)])
                    .importance(1.0),
            )
            .expect("store");
        // one match, same weight as "one heavy" but lower importance
        store
            .store_memory(
                NewMemory::new("u", "one heavy dull")
                    .concepts([crate::types::WeightedConcept::new("sports", 1.0)])
                    .importance(0.1),
            )
            .expect("store");

        let results = store
            .retrieve(&RetrievalQuery::new("u", "").concepts(["TENNIS", "sports", "tennis"]).limit(10))
            .expect("retrieve");
        assert_eq!(
            contents(&results),
            vec!["two light", "one heavy", "one heavy dull", "one light"]
        );
        assert_eq!(results[0].score.concept_matches, 2);
        assert!((results[0].score.relevance_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn substring_orders_by_importance_then_recency() {
        let store = store();
        let now = Utc::now();
        store
            .store_memory(NewMemory::new("u", "coffee old").importance(0.5).created_at(now - Duration::days(2)))
            .expect("store");
        store
            .store_memory(NewMemory::new("u", "coffee new").importance(0.5).created_at(now))
            .expect("store");
        store
            .store_memory(NewMemory::new("u", "coffee vital").importance(0.9).created_at(now - Duration::days(9)))
            .expect("store");
        store.store_memory(NewMemory::new("u", "tea")).expect("store");

        let results = store.retrieve(&RetrievalQuery::new("u", "coffee")).expect("retrieve");
        assert_eq!(contents(&results), vec!["coffee vital", "coffee new", "coffee old"]);
        assert_eq!(results[0].score, RetrievalScore::default());
    }

    #[test]
    fn substring_treats_wildcards_literally() {
        let store = store();
        store.store_memory(NewMemory::new("u", "I got 50% off")).expect("store");
        store.store_memory(NewMemory::new("u", "I got 50 apples")).expect("store");
        store.store_memory(NewMemory::new("u", "snake_case names")).expect("store");
        store.store_memory(NewMemory::new("u", "snakeXcase names")).expect("store");

        let pct = store.retrieve(&RetrievalQuery::new("u", "50%")).expect("retrieve");
        assert_eq!(contents(&pct), vec!["I got 50% off"]);

        let underscore = store.retrieve(&RetrievalQuery::new("u", "e_c")).expect("retrieve");
        assert_eq!(contents(&underscore), vec!["snake_case names"]);

        let quote = store.retrieve(&RetrievalQuery::new("u", "'; DROP TABLE memories; --")).expect("retrieve");
        assert!(quote.is_empty());
        assert_eq!(store.memory_count("u").expect("count"), 4);
    }

    #[test]
    fn substring_is_case_sensitive() {
        let store = store();
        store.store_memory(NewMemory::new("u", "Paris in spring")).expect("store");
        assert!(store.retrieve(&RetrievalQuery::new("u", "paris")).expect("retrieve").is_empty());
        assert_eq!(store.retrieve(&RetrievalQuery::new("u", "Paris")).expect("retrieve").len(), 1);
    }

    #[test]
    fn filters_apply_in_both_modes() {
        let store = store();
        store
            .store_memory(NewMemory::new("u", "golf in conv a").conversation("a").importance(0.8).concepts(["golf"]))
            .expect("store");
        store
            .store_memory(NewMemory::new("u", "golf in conv b").conversation("b").importance(0.8).concepts(["golf"]))
            .expect("store");
        store
            .store_memory(NewMemory::new("u", "golf minor").conversation("a").importance(0.1).concepts(["golf"]))
            .expect("store");
        store
            .store_memory(NewMemory::new("other", "golf elsewhere").conversation("a").concepts(["golf"]))
            .expect("store");

        let by_concept = store
            .retrieve(&RetrievalQuery::new("u", "").concepts(["golf"]).conversation("a").min_importance(0.5))
            .expect("retrieve");
        assert_eq!(contents(&by_concept), vec!["golf in conv a"]);

        let by_text = store
            .retrieve(&RetrievalQuery::new("u", "golf").conversation("a").min_importance(0.5))
            .expect("retrieve");
        assert_eq!(contents(&by_text), vec!["golf in conv a"]);
    }

    #[test]
    fn limit_caps_and_zero_returns_nothing() {
        let store = store();
        for i in 0..6 {
            store
                .store_memory(NewMemory::new("u", format!("note {i}")))
                .expect("store");
        }
        assert_eq!(store.retrieve(&RetrievalQuery::new("u", "note")).expect("default").len(), 5);
        assert_eq!(store.retrieve(&RetrievalQuery::new("u", "note").limit(2)).expect("two").len(), 2);
        assert!(store.retrieve(&RetrievalQuery::new("u", "note").limit(0)).expect("zero").is_empty());
    }

    #[test]
    fn access_recorded_only_for_returned_rows() {
        let store = store();
        let top = store
            .store_memory(NewMemory::new("u", "pick me").importance(0.9))
            .expect("store");
        let skipped = store
            .store_memory(NewMemory::new("u", "pick me too").importance(0.2))
            .expect("store");

        let results = store.retrieve(&RetrievalQuery::new("u", "pick").limit(1)).expect("retrieve");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, top);
        assert_eq!(results[0].memory.access_count, 1);
        assert!(results[0].memory.last_accessed.is_some());

        let stored = store.get_memory(top).expect("get").expect("some");
        assert_eq!(stored.access_count, 1);
        assert_eq!(stored.last_accessed, results[0].memory.last_accessed);
        let untouched = store.get_memory(skipped).expect("get").expect("some");
        assert_eq!(untouched.access_count, 0);
        assert!(untouched.last_accessed.is_none());
    }

    #[test]
    fn invalid_queries_are_rejected() {
        let store = store();
        assert!(matches!(
            store.retrieve(&RetrievalQuery::new(" ", "x")),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.retrieve(&RetrievalQuery::new("u", "x").min_importance(f64::NAN)),
            Err(StoreError::Validation(_))
        ));
    }
}
