//! Shared fixtures for integration tests.
#![allow(dead_code)]

use abuse_engine::{
    config::EngineConfig,
    error::StoreError,
    metrics::DetectionMetrics,
    monitor::Pipeline,
    storage::SqliteModerationQueue,
    trust::StaticTrustProvider,
    window::{StoreResult, WindowStore},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const IP: &str = "4f1c2a9e0b7d4c3e8a6f5b2d1c0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e";
pub const UA: &str = "9a8b7c6d5e4f3a2b1c0d9e8f7a6b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b";

pub struct Harness {
    pub pipeline: Pipeline,
    pub queue: Arc<SqliteModerationQueue>,
    pub trust: Arc<StaticTrustProvider>,
    pub metrics: Arc<DetectionMetrics>,
}

pub fn harness(store: Arc<dyn WindowStore>) -> Harness {
    let config = EngineConfig::default();
    let queue = Arc::new(SqliteModerationQueue::open_in_memory().unwrap());
    let trust = Arc::new(StaticTrustProvider::new());
    let metrics = Arc::new(DetectionMetrics::new());
    let pipeline = Pipeline::new(&config, store, queue.clone(), trust.clone(), metrics.clone());
    Harness {
        pipeline,
        queue,
        trust,
        metrics,
    }
}

/// Every operation fails as if the cache cluster were down.
pub struct UnavailableStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".into()))
}

#[async_trait]
impl WindowStore for UnavailableStore {
    async fn incr(&self, _key: &str, _ttl: Duration) -> StoreResult<i64> {
        down()
    }
    async fn set_add(&self, _key: &str, _member: &str, _ttl: Duration) -> StoreResult<bool> {
        down()
    }
    async fn set_card(&self, _key: &str) -> StoreResult<u64> {
        down()
    }
    async fn set_members(&self, _key: &str) -> StoreResult<Vec<String>> {
        down()
    }
    async fn list_push(&self, _key: &str, _value: &str, _cap: usize, _ttl: Duration) -> StoreResult<()> {
        down()
    }
    async fn list_range(&self, _key: &str, _limit: usize) -> StoreResult<Vec<String>> {
        down()
    }
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }
}

/// Answers every operation, but only after `delay`.
pub struct SlowStore {
    pub delay: Duration,
}

#[async_trait]
impl WindowStore for SlowStore {
    async fn incr(&self, _key: &str, _ttl: Duration) -> StoreResult<i64> {
        tokio::time::sleep(self.delay).await;
        Ok(1)
    }
    async fn set_add(&self, _key: &str, _member: &str, _ttl: Duration) -> StoreResult<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }
    async fn set_card(&self, _key: &str) -> StoreResult<u64> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }
    async fn set_members(&self, _key: &str) -> StoreResult<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
    async fn list_push(&self, _key: &str, _value: &str, _cap: usize, _ttl: Duration) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn list_range(&self, _key: &str, _limit: usize) -> StoreResult<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }
}
