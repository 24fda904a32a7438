//! Pipeline benchmark: one action through extraction, scoring and flagging
//! against the in-memory window store.

use abuse_engine::config::EngineConfig;
use abuse_engine::metrics::DetectionMetrics;
use abuse_engine::monitor::Pipeline;
use abuse_engine::storage::SqliteModerationQueue;
use abuse_engine::trust::StaticTrustProvider;
use abuse_engine::window::MemoryWindowStore;
use abuse_engine::{ActionEvent, UserProfile, VoteDirection};
use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use uuid::Uuid;

const IP: &str = "ip-bench";
const UA: &str = "ua-bench";

fn pipeline() -> (Pipeline, Arc<StaticTrustProvider>) {
    let config = EngineConfig::default();
    let queue = Arc::new(SqliteModerationQueue::open_in_memory().expect("in-memory queue"));
    let trust = Arc::new(StaticTrustProvider::new());
    let pipeline = Pipeline::new(
        &config,
        Arc::new(MemoryWindowStore::default()),
        queue,
        trust.clone(),
        Arc::new(DetectionMetrics::new()),
    );
    (pipeline, trust)
}

fn bench_single_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (pipeline, trust) = pipeline();
    let user = Uuid::new_v4();
    trust.insert(user, UserProfile::new(60, Utc::now() - Duration::days(120)));

    c.bench_function("pipeline_vote_single_user", |b| {
        b.iter(|| {
            let ev = ActionEvent::vote(user, Uuid::new_v4(), VoteDirection::Up, IP, UA, Utc::now());
            black_box(rt.block_on(pipeline.process(&ev)))
        })
    });
}

fn bench_vote_ring(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (pipeline, trust) = pipeline();
    let ring: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
    for user in &ring {
        trust.insert(*user, UserProfile::new(15, Utc::now() - Duration::days(3)));
    }
    let clip = Uuid::new_v4();
    let mut i = 0usize;

    c.bench_function("pipeline_vote_ring_flagging", |b| {
        b.iter(|| {
            i += 1;
            let user = ring[i % ring.len()];
            let ev = ActionEvent::vote(user, clip, VoteDirection::Up, IP, UA, Utc::now());
            black_box(rt.block_on(pipeline.process(&ev)))
        })
    });
}

criterion_group!(benches, bench_single_user, bench_vote_ring);
criterion_main!(benches);
