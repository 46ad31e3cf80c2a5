// Benchmarks for the hot paths of the memory facade.
//
// Run with: cargo bench --bench memory_bench

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jarvis_lib::engine::config::RetentionConfig;
use jarvis_lib::{Interaction, MemoryManager, MemoryStore, Speaker, Summarizer, WorkingSet};

fn in_memory_manager() -> MemoryManager {
    MemoryManager::from_parts(
        WorkingSet::new(50, None),
        MemoryStore::open_in_memory().unwrap(),
        Summarizer::default(),
        RetentionConfig { auto_every: 0, ..RetentionConfig::default() },
    )
}

fn bench_record(c: &mut Criterion) {
    let memory = in_memory_manager();
    c.bench_function("record_turn", |b| {
        b.iter(|| memory.record(Speaker::User, black_box("What's the weather like today?")).unwrap())
    });
}

fn bench_recall(c: &mut Criterion) {
    let memory = in_memory_manager();
    for i in 0..50 {
        memory.record(Speaker::User, &format!("turn {}", i)).unwrap();
    }
    c.bench_function("recall_10", |b| b.iter(|| black_box(memory.recall(10))));
}

fn bench_search(c: &mut Criterion) {
    let memory = in_memory_manager();
    for i in 0..2_000 {
        memory.record(Speaker::User, &format!("remember note {}", i)).unwrap();
    }
    c.bench_function("search_2000", |b| b.iter(|| memory.search(black_box("note 19"), 10).unwrap()));
}

fn bench_summarize(c: &mut Criterion) {
    let summarizer = Summarizer::default();
    let now = Utc::now();
    let interactions: Vec<_> = (0..1_000)
        .map(|i| {
            Interaction::at(
                now - Duration::hours(i),
                Speaker::User,
                format!("look up the schedule on screen {}, remember it", i),
            )
        })
        .collect();
    c.bench_function("summarize_1000", |b| b.iter(|| summarizer.summarize(black_box(&interactions))));
}

criterion_group!(benches, bench_record, bench_recall, bench_search, bench_summarize);
criterion_main!(benches);
