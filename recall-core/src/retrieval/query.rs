//! Parameterised SQL composition for retrieval.
//!
//! The SQL text is assembled only from the fixed fragments in this file;
//! every caller-supplied value goes through [`SqlBuilder::bind`] and reaches
//! SQLite as a bound parameter.

use rusqlite::types::Value;

use crate::schema::MEMORY_COLUMNS;

/// Which ranking strategy a query uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Rank by matching concepts, then summed link weight, then importance.
    ConceptRanked,
    /// Filter by literal substring, rank by importance then recency.
    SubstringRanked,
}

/// Accumulates SQL text and positional parameters side by side.
#[derive(Debug, Default)]
pub(crate) struct SqlBuilder {
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    pub(crate) fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Bind `value` and append its `?N` placeholder.
    pub(crate) fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = format!("?{}", self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub(crate) fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Filters shared by both ranking modes.
#[derive(Debug)]
pub(crate) struct Filters<'a> {
    pub user_id: &'a str,
    pub conversation_id: Option<&'a str>,
    pub min_importance: f64,
    pub limit: usize,
}

fn push_filters(b: &mut SqlBuilder, filters: &Filters<'_>) {
    b.push(" WHERE m.user_id = ").bind(filters.user_id.to_owned());
    if let Some(conversation) = filters.conversation_id {
        b.push(" AND m.conversation_id = ").bind(conversation.to_owned());
    }
    b.push(" AND m.importance >= ").bind(filters.min_importance);
}

fn push_limit(b: &mut SqlBuilder, limit: usize) {
    b.push(" LIMIT ").bind(i64::try_from(limit).unwrap_or(i64::MAX));
}

/// Concept-ranked query. `concepts` must be non-empty and normalised.
pub(crate) fn concept_ranked(filters: &Filters<'_>, concepts: &[String]) -> (String, Vec<Value>) {
    let mut b = SqlBuilder::default();
    b.push("SELECT ")
        .push(MEMORY_COLUMNS)
        .push(
            ", COUNT(DISTINCT c.id) AS concept_matches, SUM(mc.weight) AS relevance_score \
             FROM memories m \
             JOIN memory_concepts mc ON mc.memory_id = m.id \
             JOIN concepts c ON c.id = mc.concept_id",
        );
    push_filters(&mut b, filters);
    b.push(" AND c.text IN (");
    for (i, concept) in concepts.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.bind(concept.clone());
    }
    b.push(")");
    b.push(
        " GROUP BY m.id \
         ORDER BY concept_matches DESC, relevance_score DESC, m.importance DESC, m.rowid ASC",
    );
    push_limit(&mut b, filters.limit);
    b.finish()
}

/// Substring-ranked query; `needle` is matched literally with `instr`.
pub(crate) fn substring_ranked(filters: &Filters<'_>, needle: &str) -> (String, Vec<Value>) {
    let mut b = SqlBuilder::default();
    b.push("SELECT ")
        .push(MEMORY_COLUMNS)
        .push(", 0 AS concept_matches, 0.0 AS relevance_score FROM memories m");
    push_filters(&mut b, filters);
    b.push(" AND instr(m.content, ").bind(needle.to_owned()).push(") > 0");
    b.push(" ORDER BY m.importance DESC, m.created_at DESC, m.rowid ASC");
    push_limit(&mut b, filters.limit);
    b.finish()
}
