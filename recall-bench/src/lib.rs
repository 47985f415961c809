//! Fixtures shared by the recall benchmarks.

use chrono::{Duration, Utc};
use recall_core::config::GeneralConfig;
use recall_core::{MemoryStore, NewMemory, RecallConfig, WeightedConcept, telemetry};

/// Topic words cycled through when seeding memories.
pub const TOPICS: &[&str] = &[
    "tennis", "cooking", "travel", "music", "reading", "hiking", "coffee", "movies",
];

/// Content and concepts of the `i`-th seeded memory.
#[must_use]
pub fn seeded_memory(user_id: &str, i: usize) -> NewMemory {
    let primary = TOPICS[i % TOPICS.len()];
    let secondary = TOPICS[(i / TOPICS.len()) % TOPICS.len()];
    #[allow(clippy::cast_precision_loss)]
    let importance = (i % 10) as f64 / 10.0;
    NewMemory::new(
        user_id,
        format!("Memory {i}: talked about {primary} and a bit of {secondary}"),
    )
    .importance(importance)
    .created_at(Utc::now() - Duration::days(i64::try_from(i % 730).unwrap_or(0)))
    .concepts([
        WeightedConcept::new(primary, 1.0),
        WeightedConcept::new(secondary, 0.5),
    ])
}

/// An in-memory store holding `count` seeded memories for `user_id`.
///
/// # Panics
/// If the store cannot be opened or seeded; benches have no error path.
#[must_use]
#[allow(clippy::expect_used)]
pub fn seeded_store(user_id: &str, count: usize) -> MemoryStore {
    let store = MemoryStore::open_in_memory(&RecallConfig::default()).expect("open store");
    for i in 0..count {
        store.store_memory(seeded_memory(user_id, i)).expect("seed memory");
    }
    store
}

/// Install a subscriber at `warn` (or `RUST_LOG`) so per-call debug events
/// stay out of the measurements.
pub fn init_logging() {
    let general = GeneralConfig {
        log_level: "warn".into(),
    };
    let _ = telemetry::init_tracing(&general);
}

/// A chat message for the `i`-th processing iteration.
#[must_use]
pub fn chat_message(i: usize) -> String {
    let topic = TOPICS[i % TOPICS.len()];
    format!("I love {topic}. We live in Lisbon. Please forget about {topic}.")
}
