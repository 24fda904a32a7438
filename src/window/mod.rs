//! Windowed counter store: counters, sets and capped lists with per-key expiry.
//!
//! Each operation is atomic per key. Keys carry the TTL of the window they model,
//! so tracked state expires on its own.

mod memory;
mod timeout;
pub mod keys;

pub use memory::{Clock, ManualClock, MemoryWindowStore, SystemClock};
pub use timeout::TimeoutStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

pub const WINDOW_5_MIN: Duration = Duration::from_secs(5 * 60);
pub const WINDOW_1_HOUR: Duration = Duration::from_secs(60 * 60);
pub const WINDOW_24_HOURS: Duration = Duration::from_secs(24 * 60 * 60);
pub const WINDOW_7_DAYS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Increment a counter. The TTL is applied when the counter is created, so the
    /// window is fixed from the first increment.
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Add a member to a set and refresh its TTL. Returns `true` if the member is new.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool>;

    async fn set_card(&self, key: &str) -> StoreResult<u64>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Push to the head of a list, keep the newest `cap` entries and refresh the TTL.
    async fn list_push(&self, key: &str, value: &str, cap: usize, ttl: Duration) -> StoreResult<()>;

    /// Newest-first, at most `limit` entries.
    async fn list_range(&self, key: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Read a scalar value by key.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Current counter value; a missing key reads as 0.
    async fn counter(&self, key: &str) -> StoreResult<i64> {
        match self.get(key).await? {
            None => Ok(0),
            Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                value: raw,
            }),
        }
    }
}
