//! Moderation queue benchmark: inserts and merges against SQLite.

use abuse_engine::storage::{ModerationQueue, NewFlag, SqliteModerationQueue};
use abuse_engine::ContentType;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn new_flag(content_id: Uuid) -> NewFlag {
    NewFlag {
        event_id: Uuid::new_v4(),
        content_type: ContentType::User,
        content_id,
        reason: "High voting velocity; Coordinated voting detected".to_string(),
        priority: 72,
        confidence_score: 0.8,
        created_at: Utc::now(),
    }
}

fn bench_upsert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = SqliteModerationQueue::open(&dir.path().join("bench.db")).expect("queue");

    c.bench_function("queue_insert_new_content", |b| {
        b.iter(|| black_box(rt.block_on(queue.upsert(&new_flag(Uuid::new_v4())))))
    });

    let hot = Uuid::new_v4();
    c.bench_function("queue_merge_pending", |b| {
        b.iter(|| black_box(rt.block_on(queue.upsert(&new_flag(hot)))))
    });
}

criterion_group!(benches, bench_upsert);
criterion_main!(benches);
