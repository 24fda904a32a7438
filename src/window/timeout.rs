//! Bounds every store round-trip with a deadline.

use super::{StoreResult, WindowStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct TimeoutStore {
    inner: Arc<dyn WindowStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn WindowStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = StoreResult<T>> + Send) -> StoreResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(self.limit)),
        }
    }
}

#[async_trait]
impl WindowStore for TimeoutStore {
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        self.bounded(self.inner.incr(key, ttl)).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded(self.inner.set_add(key, member, ttl)).await
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        self.bounded(self.inner.set_card(key)).await
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.bounded(self.inner.set_members(key)).await
    }

    async fn list_push(&self, key: &str, value: &str, cap: usize, ttl: Duration) -> StoreResult<()> {
        self.bounded(self.inner.list_push(key, value, cap, ttl)).await
    }

    async fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        self.bounded(self.inner.list_range(key, limit)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }
}
