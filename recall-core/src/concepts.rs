//! Concept index — maps concept text to stable ids and links concepts to
//! memories.
//!
//! Concept text is normalised (trimmed, lower-cased) before it touches the
//! database, and `concepts.text` carries a `UNIQUE` constraint. Resolution
//! is `INSERT … ON CONFLICT DO NOTHING` followed by a lookup, so two writers
//! racing on the same new concept always converge on one row.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::types::{ConceptId, MemoryId, WeightedConcept};

/// Canonical form of a concept string.
#[must_use]
pub fn normalize_concept(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Normalise, validate and de-duplicate a concept set.
///
/// Blank texts are dropped. Duplicates (after normalisation) keep the larger
/// weight. Order of first appearance is preserved.
///
/// # Errors
/// Returns [`StoreError::Validation`] for weights outside `(0.0, 1.0]`.
pub fn prepare_concepts(concepts: &[WeightedConcept]) -> Result<Vec<(String, f64)>> {
    let mut order: Vec<String> = Vec::with_capacity(concepts.len());
    let mut weights: HashMap<String, f64> = HashMap::with_capacity(concepts.len());

    for concept in concepts {
        if !(concept.weight > 0.0 && concept.weight <= 1.0) {
            return Err(StoreError::invalid(format!(
                "concept '{}' has weight {} outside (0, 1]",
                concept.text, concept.weight
            )));
        }
        let text = normalize_concept(&concept.text);
        if text.is_empty() {
            continue;
        }
        match weights.get_mut(&text) {
            Some(existing) => *existing = existing.max(concept.weight),
            None => {
                weights.insert(text.clone(), concept.weight);
                order.push(text);
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|text| {
            let weight = weights[&text];
            (text, weight)
        })
        .collect())
}

/// Look up the id for `text`, creating the concept if it does not exist.
///
/// `text` must already be normalised. Run inside a write transaction.
pub(crate) fn resolve_concept(conn: &Connection, text: &str) -> Result<ConceptId> {
    let fresh = ConceptId::new();
    conn.prepare_cached("INSERT INTO concepts (id, text) VALUES (?1, ?2) ON CONFLICT(text) DO NOTHING")?
        .execute(params![fresh.to_string(), text])?;

    let id: String = conn
        .prepare_cached("SELECT id FROM concepts WHERE text = ?1")?
        .query_row(params![text], |row| row.get(0))?;
    id.parse()
        .map_err(|e: uuid::Error| StoreError::Serialization(format!("concept id '{id}': {e}")))
}

/// Link a memory to a concept. Re-linking the same pair keeps the larger
/// weight rather than creating a second row.
pub(crate) fn link_memory_to_concept(
    conn: &Connection,
    memory_id: MemoryId,
    concept_id: ConceptId,
    weight: f64,
) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO memory_concepts (memory_id, concept_id, weight) VALUES (?1, ?2, ?3)
         ON CONFLICT(memory_id, concept_id) DO UPDATE SET weight = MAX(weight, excluded.weight)",
    )?
    .execute(params![memory_id.to_string(), concept_id.to_string(), weight])?;
    Ok(())
}

/// Concepts linked to `memory_id`, ordered by text.
pub(crate) fn concepts_for(conn: &Connection, memory_id: MemoryId) -> Result<Vec<WeightedConcept>> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.text, mc.weight
         FROM memory_concepts mc
         JOIN concepts c ON c.id = mc.concept_id
         WHERE mc.memory_id = ?1
         ORDER BY c.text",
    )?;
    let rows = stmt.query_map(params![memory_id.to_string()], |row| {
        Ok(WeightedConcept::new(row.get::<_, String>(0)?, row.get(1)?))
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Id of an existing concept, without creating it.
pub(crate) fn find_concept(conn: &Connection, text: &str) -> Result<Option<ConceptId>> {
    let id: Option<String> = conn
        .prepare_cached("SELECT id FROM concepts WHERE text = ?1")?
        .query_row(params![normalize_concept(text)], |row| row.get(0))
        .optional()?;
    id.map(|id| {
        id.parse()
            .map_err(|e: uuid::Error| StoreError::Serialization(format!("concept id '{id}': {e}")))
    })
    .transpose()
}
