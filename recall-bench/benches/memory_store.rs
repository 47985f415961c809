//! Recall Benchmark Suite
//!
//! Targets on a developer laptop:
//!   store_memory_in_memory ............ < 100μs
//!   retrieve_concept_top5_from_1000 ... < 2ms
//!   retrieve_substring_top5_from_1000 . < 2ms
//!   prune_1000 ........................ < 20ms
//!   process_message ................... < 500μs

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use recall_bench::{chat_message, init_logging, seeded_memory, seeded_store};
use recall_core::config::StorageConfig;
use recall_core::{MemoryStore, RecallConfig, RetrievalQuery};

/// Benchmark: Single memory + two concept links into an in-memory store.
fn bench_store_in_memory(c: &mut Criterion) {
    init_logging();
    let store = seeded_store("bench", 0);
    let mut i = 0;
    c.bench_function("store_memory_in_memory", |b| {
        b.iter(|| {
            i += 1;
            let id = store.store_memory(seeded_memory("bench", black_box(i))).expect("store");
            black_box(id);
        });
    });
}

/// Benchmark: Same write against a WAL database file.
fn bench_store_on_disk(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = RecallConfig {
        storage: StorageConfig {
            db_path: dir.path().join("bench.db"),
            ..StorageConfig::default()
        },
        ..RecallConfig::default()
    };
    let store = MemoryStore::open(&config).expect("open");
    let mut i = 0;
    c.bench_function("store_memory_on_disk", |b| {
        b.iter(|| {
            i += 1;
            let id = store.store_memory(seeded_memory("bench", black_box(i))).expect("store");
            black_box(id);
        });
    });
}

/// Benchmark: Concept-ranked top-5 from 1000 memories.
fn bench_retrieve_concept(c: &mut Criterion) {
    let store = seeded_store("bench", 1000);
    let query = RetrievalQuery::new("bench", "tennis or hiking?").concepts(["tennis", "hiking"]);
    c.bench_function("retrieve_concept_top5_from_1000", |b| {
        b.iter(|| {
            let hits = store.retrieve(black_box(&query)).expect("retrieve");
            black_box(hits);
        });
    });
}

/// Benchmark: Substring-ranked top-5 from 1000 memories.
fn bench_retrieve_substring(c: &mut Criterion) {
    let store = seeded_store("bench", 1000);
    let query = RetrievalQuery::new("bench", "bit of coffee");
    c.bench_function("retrieve_substring_top5_from_1000", |b| {
        b.iter(|| {
            let hits = store.retrieve(black_box(&query)).expect("retrieve");
            black_box(hits);
        });
    });
}

/// Benchmark: Retention pass over 1000 memories spread across two years.
fn bench_prune(c: &mut Criterion) {
    c.bench_function("prune_1000", |b| {
        b.iter_batched(
            || seeded_store("bench", 1000),
            |store| {
                let removed = store.prune_old(black_box(365), black_box(0.3)).expect("prune");
                black_box(removed);
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark: Stats aggregation for one user.
fn bench_user_stats(c: &mut Criterion) {
    let store = seeded_store("bench", 1000);
    c.bench_function("user_stats_1000", |b| {
        b.iter(|| {
            let stats = store.user_stats(black_box("bench")).expect("stats");
            black_box(stats);
        });
    });
}

/// Benchmark: Candidate extraction, two stores and one forget request.
fn bench_process_message(c: &mut Criterion) {
    let store = seeded_store("bench", 100);
    let mut i = 0;
    c.bench_function("process_message", |b| {
        b.iter(|| {
            i += 1;
            let outcome = store
                .process_message("bench", black_box(&chat_message(i)), Some("bench-chat"))
                .expect("process");
            black_box(outcome);
        });
    });
}

criterion_group!(
    benches,
    bench_store_in_memory,
    bench_store_on_disk,
    bench_retrieve_concept,
    bench_retrieve_substring,
    bench_prune,
    bench_user_stats,
    bench_process_message,
);
criterion_main!(benches);
